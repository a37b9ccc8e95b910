use crate::core::models::ids::BodyId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{parameter}': {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },
    #[error("Body group '{0}' is empty")]
    EmptyGroup(&'static str),
}

/// Checks that `value` is finite and positive.
pub(crate) fn require_positive(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            parameter,
            reason: format!("must be finite and positive, got {value}"),
        })
    }
}

/// Checks that `value` is finite and not negative.
pub(crate) fn require_non_negative(
    parameter: &'static str,
    value: f64,
) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            parameter,
            reason: format!("must be finite and non-negative, got {value}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactTrackerConfig {
    pub label: String,
    pub group_i: Vec<BodyId>,
    pub group_ii: Vec<BodyId>,
    pub contact_range: f64,
    pub slack: f64,
}

#[derive(Default)]
pub struct ContactTrackerConfigBuilder {
    label: Option<String>,
    group_i: Option<Vec<BodyId>>,
    group_ii: Option<Vec<BodyId>>,
    contact_range: Option<f64>,
    slack: Option<f64>,
}

impl ContactTrackerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
    pub fn group_i(mut self, bodies: Vec<BodyId>) -> Self {
        self.group_i = Some(bodies);
        self
    }
    pub fn group_ii(mut self, bodies: Vec<BodyId>) -> Self {
        self.group_ii = Some(bodies);
        self
    }
    pub fn contact_range(mut self, range: f64) -> Self {
        self.contact_range = Some(range);
        self
    }
    pub fn slack(mut self, slack: f64) -> Self {
        self.slack = Some(slack);
        self
    }

    pub fn build(self) -> Result<ContactTrackerConfig, ConfigError> {
        let group_i = self.group_i.ok_or(ConfigError::MissingParameter("group_i"))?;
        let group_ii = self
            .group_ii
            .ok_or(ConfigError::MissingParameter("group_ii"))?;
        let contact_range = self
            .contact_range
            .ok_or(ConfigError::MissingParameter("contact_range"))?;
        let slack = self.slack.ok_or(ConfigError::MissingParameter("slack"))?;

        if group_i.is_empty() {
            return Err(ConfigError::EmptyGroup("group_i"));
        }
        if group_ii.is_empty() {
            return Err(ConfigError::EmptyGroup("group_ii"));
        }
        require_positive("contact_range", contact_range)?;
        require_non_negative("slack", slack)?;

        Ok(ContactTrackerConfig {
            label: self.label.unwrap_or_else(|| "contacts".to_string()),
            group_i,
            group_ii,
            contact_range,
            slack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn ids(xs: &[u64]) -> Vec<BodyId> {
        xs.iter().map(|&x| BodyId::from(KeyData::from_ffi(x))).collect()
    }

    #[test]
    fn builder_succeeds_with_all_parameters() {
        let config = ContactTrackerConfigBuilder::new()
            .label("fg-kap")
            .group_i(ids(&[1, 2]))
            .group_ii(ids(&[3]))
            .contact_range(1.0)
            .slack(2.0)
            .build()
            .unwrap();
        assert_eq!(config.label, "fg-kap");
        assert_eq!(config.group_i.len(), 2);
        assert_eq!(config.contact_range, 1.0);
    }

    #[test]
    fn builder_defaults_label() {
        let config = ContactTrackerConfigBuilder::new()
            .group_i(ids(&[1]))
            .group_ii(ids(&[2]))
            .contact_range(1.0)
            .slack(0.0)
            .build()
            .unwrap();
        assert_eq!(config.label, "contacts");
    }

    #[test]
    fn builder_fails_if_parameter_is_missing() {
        let result = ContactTrackerConfigBuilder::new()
            .group_i(ids(&[1]))
            .group_ii(ids(&[2]))
            .slack(1.0)
            .build();
        assert_eq!(result, Err(ConfigError::MissingParameter("contact_range")));
    }

    #[test]
    fn builder_fails_for_empty_group() {
        let result = ContactTrackerConfigBuilder::new()
            .group_i(ids(&[1]))
            .group_ii(Vec::new())
            .contact_range(1.0)
            .slack(1.0)
            .build();
        assert_eq!(result, Err(ConfigError::EmptyGroup("group_ii")));
    }

    #[test]
    fn builder_fails_for_non_positive_range() {
        let result = ContactTrackerConfigBuilder::new()
            .group_i(ids(&[1]))
            .group_ii(ids(&[2]))
            .contact_range(0.0)
            .slack(1.0)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                parameter: "contact_range",
                ..
            })
        ));
    }
}
