//! Runtime overrides of loading parameters.
//!
//! Distributed readers share one configuration file and override their
//! source and shard at startup.

use crate::{common::*, config::LoadConfig};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use strum::{AsRefStr, Display, EnumString};

/// Identifies an overridable parameter. The numeric values are stable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    FromPrimitive,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverridableParamId {
    SourcePath = 0,
    LoaderIndex = 1,
    LoadersCount = 2,
    SourceName = 3,
}

impl OverridableParamId {
    pub fn from_code(code: u32) -> Result<Self> {
        Self::from_u32(code).ok_or_else(|| format_err!("invalid overridable parameter id {}", code))
    }
}

/// A parameter value given as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverridableParam {
    pub id: OverridableParamId,
    pub value: String,
}

impl FromStr for OverridableParam {
    type Err = Error;

    /// Parses `id=value` where `id` is a name such as `loader_index` or its
    /// numeric code.
    fn from_str(text: &str) -> Result<Self> {
        let (id, value) = text
            .split_once('=')
            .ok_or_else(|| format_err!("expect 'id=value', but get '{}'", text))?;
        let id = id.trim();
        let id = match id.parse::<u32>() {
            Ok(code) => OverridableParamId::from_code(code)?,
            Err(_) => OverridableParamId::from_str(id)
                .map_err(|_| format_err!("unknown overridable parameter '{}'", id))?,
        };

        Ok(Self {
            id,
            value: value.to_owned(),
        })
    }
}

/// Applies `overrides` in order. Later values of the same parameter win.
pub fn apply_runtime_overrides(config: &mut LoadConfig, overrides: &[OverridableParam]) -> Result<()> {
    overrides.iter().try_for_each(|param| -> Result<_> {
        let OverridableParam { id, value } = param;

        match id {
            OverridableParamId::SourcePath => {
                config.source_path = Some(PathBuf::from(value));
            }
            OverridableParamId::LoaderIndex => {
                config.loader_index = parse_u32(*id, value)? as usize;
            }
            OverridableParamId::LoadersCount => {
                config.loaders_count = parse_u32(*id, value)? as usize;
            }
            OverridableParamId::SourceName => {
                config.source_name = Some(value.clone());
            }
        }

        info!("override {} = {}", id, value);
        Ok(())
    })
}

fn parse_u32(id: OverridableParamId, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value '{}' for {}", value, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Result<LoadConfig> {
        let config = json5::from_str(r#"{ source: ["train.ids"], blobs: [] }"#)?;
        Ok(config)
    }

    #[test]
    fn overrides_by_id() -> Result<()> {
        let mut config = config()?;
        let overrides: Vec<OverridableParam> = ["0=/mnt/data", "loader_index=2", "2 = 4", "source_name=part.ids"]
            .iter()
            .map(|text| text.parse())
            .collect::<Result<_>>()?;
        apply_runtime_overrides(&mut config, &overrides)?;

        assert_eq!(config.loader_index, 2);
        assert_eq!(config.loaders_count, 4);
        assert_eq!(config.source_files(), vec![PathBuf::from("/mnt/data/part.ids")]);
        Ok(())
    }

    #[test]
    fn invalid_overrides() -> Result<()> {
        assert!("7=1".parse::<OverridableParam>().is_err());
        assert!("loader_index".parse::<OverridableParam>().is_err());

        let mut config = config()?;
        let param = OverridableParam {
            id: OverridableParamId::LoadersCount,
            value: "-1".into(),
        };
        assert!(apply_runtime_overrides(&mut config, &[param]).is_err());
        assert_eq!(OverridableParamId::from_code(1)?, OverridableParamId::LoaderIndex);
        Ok(())
    }
}
