//! Validation rules
//!
//! Validation failures are not errors: they land on the entity's error map
//! and surface as `false` from `Model::validates` / `save`, leaving the
//! entity inspectable for display.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::entity::Entity;
use crate::value;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email regex")
});

/// Which half of the save lifecycle an operation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Create,
    Update,
}

#[derive(Debug, Clone)]
pub enum ValidationRule {
    NotBlank,
    Email,
    Numeric,
    Length { min: Option<usize>, max: Option<usize> },
    InList(Vec<Value>),
    Pattern(String),
}

/// One rule bound to a field.
#[derive(Debug, Clone)]
pub struct Validator {
    pub field: String,
    pub rule: ValidationRule,
    pub message: Option<String>,
    /// Restrict the rule to creates or updates.
    pub on: Option<SaveMode>,
    /// Skip the rule when the value is absent or empty.
    pub allow_empty: bool,
}

impl Validator {
    pub fn new(field: impl Into<String>, rule: ValidationRule) -> Self {
        Validator {
            field: field.into(),
            rule,
            message: None,
            on: None,
            allow_empty: false,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn on(mut self, mode: SaveMode) -> Self {
        self.on = Some(mode);
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    pub fn applies(&self, mode: SaveMode) -> bool {
        self.on.map_or(true, |m| m == mode)
    }

    /// Check a field value, recording a message on the entity on failure.
    /// Returns whether the value passed.
    pub fn check(&self, entity: &mut Entity) -> bool {
        let current = entity.get(&self.field).cloned();
        let empty = current.as_ref().map_or(true, value::is_empty);
        if empty && self.allow_empty {
            return true;
        }
        let passed = match &self.rule {
            ValidationRule::NotBlank => !empty,
            ValidationRule::Email => current
                .as_ref()
                .and_then(Value::as_str)
                .map_or(false, |s| EMAIL.is_match(s)),
            ValidationRule::Numeric => match current.as_ref() {
                Some(Value::Number(_)) => true,
                Some(Value::String(s)) => s.parse::<f64>().is_ok(),
                _ => false,
            },
            ValidationRule::Length { min, max } => {
                let len = current
                    .as_ref()
                    .and_then(Value::as_str)
                    .map_or(0, |s| s.chars().count());
                min.map_or(true, |m| len >= m) && max.map_or(true, |m| len <= m)
            }
            ValidationRule::InList(allowed) => current
                .as_ref()
                .map_or(false, |v| allowed.iter().any(|a| value::loosely_equal(a, v))),
            ValidationRule::Pattern(pattern) => match Regex::new(pattern) {
                Ok(re) => current
                    .as_ref()
                    .and_then(Value::as_str)
                    .map_or(false, |s| re.is_match(s)),
                Err(_) => false,
            },
        };
        if !passed {
            let message = self
                .message
                .clone()
                .unwrap_or_else(|| self.default_message());
            entity.error(self.field.clone(), message);
        }
        passed
    }

    fn default_message(&self) -> String {
        match &self.rule {
            ValidationRule::NotBlank => "cannot be blank".to_string(),
            ValidationRule::Email => "is not a valid email address".to_string(),
            ValidationRule::Numeric => "must be a number".to_string(),
            ValidationRule::Length { min, max } => match (min, max) {
                (Some(min), Some(max)) => {
                    format!("must be between {} and {} characters", min, max)
                }
                (Some(min), None) => format!("must be at least {} characters", min),
                (None, Some(max)) => format!("must be at most {} characters", max),
                (None, None) => "has an invalid length".to_string(),
            },
            ValidationRule::InList(_) => "is not an accepted value".to_string(),
            ValidationRule::Pattern(_) => "does not match the expected format".to_string(),
        }
    }
}
