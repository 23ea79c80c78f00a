use anyhow::anyhow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Local,
    Production,
}

impl TryFrom<&String> for Stage {
    type Error = anyhow::Error;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" | "dev" | "development" => Ok(Stage::Local),
            "production" | "prod" => Ok(Stage::Production),
            other => Err(anyhow!("unknown stage: {}", other)),
        }
    }
}
