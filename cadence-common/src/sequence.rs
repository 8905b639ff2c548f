//! Drip sequence definitions

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    id::SequenceId,
    validation::{self, ValidationError},
};

/// Domain events that enroll a recipient into matching sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    NewDonor,
    NewSubscriber,
    DonationCompleted,
    #[serde(rename = "INACTIVE_30")]
    Inactive30,
    #[serde(rename = "INACTIVE_90")]
    Inactive90,
}

impl Trigger {
    pub const ALL: [Self; 5] = [
        Self::NewDonor,
        Self::NewSubscriber,
        Self::DonationCompleted,
        Self::Inactive30,
        Self::Inactive90,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NewDonor => "NEW_DONOR",
            Self::NewSubscriber => "NEW_SUBSCRIBER",
            Self::DonationCompleted => "DONATION_COMPLETED",
            Self::Inactive30 => "INACTIVE_30",
            Self::Inactive90 => "INACTIVE_90",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown trigger '{0}'")]
pub struct TriggerParseError(String);

impl FromStr for Trigger {
    type Err = TriggerParseError;

    /// Accepts `NEW_SUBSCRIBER`, `new_subscriber` and `new-subscriber`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|trigger| trigger.as_str() == normalised)
            .ok_or_else(|| TriggerParseError(s.to_string()))
    }
}

/// One email in a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position, dense within the sequence
    pub order: u32,
    /// Days after the previous step (or after enrollment for step 1)
    pub delay_days: u32,
    pub subject: String,
    pub html_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub name: String,
    pub trigger: Trigger,
    pub active: bool,
    /// Ordered by `order`, starting at 1
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
}

impl Sequence {
    /// Look up a step by its 1-based order
    #[must_use]
    pub fn step(&self, order: u32) -> Option<&Step> {
        self.steps.iter().find(|step| step.order == order)
    }

    #[must_use]
    pub fn first_step(&self) -> Option<&Step> {
        self.step(1)
    }

    #[must_use]
    pub fn step_count(&self) -> u32 {
        u32::try_from(self.steps.len()).unwrap_or(u32::MAX)
    }
}

/// Operator input for a new step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStep {
    #[serde(default)]
    pub delay_days: u32,
    pub subject: String,
    pub html_content: String,
}

/// Operator input for a new sequence.
///
/// Steps are numbered in the order given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSequence {
    pub name: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub active: Option<bool>,
    pub steps: Vec<NewStep>,
}

impl NewSequence {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::title("Name", &self.name)?;

        if self.steps.is_empty() {
            return Err(ValidationError::NoSteps);
        }

        for (idx, step) in self.steps.iter().enumerate() {
            validation::title("Subject", &step.subject)
                .and_then(|()| validation::body("HTML content", &step.html_content))
                .map_err(|source| ValidationError::Step {
                    order: idx + 1,
                    source: Box::new(source),
                })?;
        }

        Ok(())
    }

    /// Materialise into a stored sequence with dense step numbering
    #[must_use]
    pub fn into_sequence(self, id: SequenceId, created_at: DateTime<Utc>) -> Sequence {
        let steps = self
            .steps
            .into_iter()
            .zip(1..)
            .map(|(step, order)| Step {
                order,
                delay_days: step.delay_days,
                subject: step.subject,
                html_content: step.html_content,
            })
            .collect();

        Sequence {
            id,
            name: self.name,
            trigger: self.trigger,
            active: self.active.unwrap_or(true),
            steps,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(delay_days: u32, subject: &str) -> NewStep {
        NewStep {
            delay_days,
            subject: subject.to_string(),
            html_content: format!("<p>{subject}</p>"),
        }
    }

    #[test]
    fn test_trigger_parse() {
        assert_eq!("NEW_SUBSCRIBER".parse::<Trigger>(), Ok(Trigger::NewSubscriber));
        assert_eq!("new-donor".parse::<Trigger>(), Ok(Trigger::NewDonor));
        assert_eq!("inactive_90".parse::<Trigger>(), Ok(Trigger::Inactive90));
        assert!("SOMETHING".parse::<Trigger>().is_err());
    }

    #[test]
    fn test_trigger_serde_names() {
        for trigger in Trigger::ALL {
            let json = serde_json::to_string(&trigger).unwrap();
            assert_eq!(json, format!("\"{}\"", trigger.as_str()));
        }
    }

    #[test]
    fn test_steps_numbered_densely() {
        let new = NewSequence {
            name: "Welcome".to_string(),
            trigger: Trigger::NewSubscriber,
            active: None,
            steps: vec![step(0, "Welcome"), step(3, "Tip"), step(7, "Ask")],
        };
        assert!(new.validate().is_ok());

        let sequence = new.into_sequence(SequenceId::generate(), Utc::now());
        let orders: Vec<_> = sequence.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(sequence.active);
        assert_eq!(sequence.step(2).map(|s| s.subject.as_str()), Some("Tip"));
        assert!(sequence.step(4).is_none());
    }

    #[test]
    fn test_validation_rejects_empty() {
        let mut new = NewSequence {
            name: "Welcome".to_string(),
            trigger: Trigger::NewDonor,
            active: Some(false),
            steps: vec![],
        };
        assert_eq!(new.validate(), Err(ValidationError::NoSteps));

        new.steps.push(step(0, ""));
        assert!(matches!(
            new.validate(),
            Err(ValidationError::Step { order: 1, .. })
        ));
    }
}
