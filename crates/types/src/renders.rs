//! Render job types and the job status state machine.
//!
//! ```text
//! pending ──> processing ──> completed
//!    │             │
//!    └─────────────┴───────> failed
//! ```
//!
//! `completed` and `failed` are terminal. Jobs are currently created directly
//! in `processing` once the token debit succeeds; `pending` is reserved for
//! pre-debit states.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    Interior,
    Exterior,
}

impl SceneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneType::Interior => "interior",
            SceneType::Exterior => "exterior",
        }
    }
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SceneType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interior" => Ok(SceneType::Interior),
            "exterior" => Ok(SceneType::Exterior),
            other => Err(ParseEnumError::new("scene type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Webp,
    Jpg,
    Png,
    Avif,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Avif => "avif",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Avif => "image/avif",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webp" => Ok(OutputFormat::Webp),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpg),
            "png" => Ok(OutputFormat::Png),
            "avif" => Ok(OutputFormat::Avif),
            other => Err(ParseEnumError::new("output format", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::Pending => "pending",
            RenderStatus::Processing => "processing",
            RenderStatus::Completed => "completed",
            RenderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            RenderStatus::Pending | RenderStatus::Processing => false,
            RenderStatus::Completed | RenderStatus::Failed => true,
        }
    }

    pub fn can_transition_to(&self, next: RenderStatus) -> bool {
        match (self, next) {
            (RenderStatus::Pending, RenderStatus::Processing) => true,
            (RenderStatus::Pending | RenderStatus::Processing, RenderStatus::Completed) => true,
            (RenderStatus::Pending | RenderStatus::Processing, RenderStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RenderStatus::Pending),
            "processing" => Ok(RenderStatus::Processing),
            "completed" => Ok(RenderStatus::Completed),
            "failed" => Ok(RenderStatus::Failed),
            other => Err(ParseEnumError::new("render status", other)),
        }
    }
}

/// Target state for a job status update.
///
/// Terminal variants carry the data their state requires, so a `completed`
/// job always has an output URL and a `failed` job always has a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Processing,
    Completed {
        rendered_image_url: String,
        completed_at: i64,
    },
    Failed {
        error_message: String,
        completed_at: i64,
    },
}

impl RenderOutcome {
    pub fn status(&self) -> RenderStatus {
        match self {
            RenderOutcome::Processing => RenderStatus::Processing,
            RenderOutcome::Completed { .. } => RenderStatus::Completed,
            RenderOutcome::Failed { .. } => RenderStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} must be between -{limit} and +{limit}, got {value}")]
pub struct AdjustmentError {
    pub field: &'static str,
    pub limit: i32,
    pub value: i32,
}

/// Visual adjustments applied when refining a render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderAdjustments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighting: Option<i32>,
}

impl RenderAdjustments {
    pub const SATURATION_LIMIT: i32 = 100;
    pub const BRIGHTNESS_LIMIT: i32 = 50;
    pub const CONTRAST_LIMIT: i32 = 50;
    pub const LIGHTING_LIMIT: i32 = 30;

    fn fields(&self) -> [(&'static str, Option<i32>, i32); 4] {
        [
            ("saturation", self.saturation, Self::SATURATION_LIMIT),
            ("brightness", self.brightness, Self::BRIGHTNESS_LIMIT),
            ("contrast", self.contrast, Self::CONTRAST_LIMIT),
            ("lighting", self.lighting, Self::LIGHTING_LIMIT),
        ]
    }

    pub fn validate(&self) -> Result<(), AdjustmentError> {
        for (field, value, limit) in self.fields() {
            if let Some(value) = value {
                if !(-limit..=limit).contains(&value) {
                    return Err(AdjustmentError {
                        field,
                        limit,
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    /// Prompt fragment such as `saturation +20, lighting -5`.
    pub fn describe(&self) -> Option<String> {
        let parts = self
            .fields()
            .iter()
            .filter_map(|(field, value, _)| match value {
                Some(v) if *v != 0 => Some(format!("{} {:+}", field, v)),
                _ => None,
            })
            .collect::<Vec<_>>();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: i32,
    pub account_id: i32,
    /// Source image; for refinements this is the parent's rendered image
    pub original_image_url: String,
    pub rendered_image_url: Option<String>,
    pub scene_type: SceneType,
    pub output_format: OutputFormat,
    pub prompt: Option<String>,
    pub parent_job_id: Option<i32>,
    pub adjustments: RenderAdjustments,
    pub status: RenderStatus,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl RenderJob {
    /// A job can seed a refinement once it has finished with an output.
    pub fn refinable_output(&self) -> Option<&str> {
        match self.status {
            RenderStatus::Completed => self.rendered_image_url.as_deref(),
            RenderStatus::Pending | RenderStatus::Processing | RenderStatus::Failed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [RenderStatus::Completed, RenderStatus::Failed] {
            for next in [
                RenderStatus::Pending,
                RenderStatus::Processing,
                RenderStatus::Completed,
                RenderStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_forward_transitions() {
        assert!(RenderStatus::Pending.can_transition_to(RenderStatus::Processing));
        assert!(RenderStatus::Processing.can_transition_to(RenderStatus::Completed));
        assert!(RenderStatus::Processing.can_transition_to(RenderStatus::Failed));
        assert!(!RenderStatus::Processing.can_transition_to(RenderStatus::Pending));
        assert!(!RenderStatus::Processing.can_transition_to(RenderStatus::Processing));
    }

    #[test]
    fn test_adjustment_bounds() {
        let ok = RenderAdjustments {
            saturation: Some(-100),
            brightness: Some(50),
            contrast: Some(-50),
            lighting: Some(30),
        };
        assert!(ok.validate().is_ok());

        let too_bright = RenderAdjustments {
            brightness: Some(51),
            ..Default::default()
        };
        let err = too_bright.validate().unwrap_err();
        assert_eq!(err.field, "brightness");
        assert_eq!(err.limit, 50);

        let too_dark = RenderAdjustments {
            lighting: Some(-31),
            ..Default::default()
        };
        assert!(too_dark.validate().is_err());
    }

    #[test]
    fn test_describe_adjustments() {
        let adj = RenderAdjustments {
            saturation: Some(20),
            brightness: Some(0),
            contrast: None,
            lighting: Some(-5),
        };
        assert_eq!(adj.describe().as_deref(), Some("saturation +20, lighting -5"));
        assert!(RenderAdjustments::default().describe().is_none());
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("jpeg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpg);
        assert_eq!(OutputFormat::Jpg.content_type(), "image/jpeg");
        assert!("gif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_refinable_output_requires_completed() {
        let mut job = RenderJob {
            id: 1,
            account_id: 1,
            original_image_url: "orig".to_string(),
            rendered_image_url: Some("out".to_string()),
            scene_type: SceneType::Interior,
            output_format: OutputFormat::Png,
            prompt: None,
            parent_job_id: None,
            adjustments: RenderAdjustments::default(),
            status: RenderStatus::Processing,
            error_message: None,
            created_at: 0,
            completed_at: None,
        };
        assert_eq!(job.refinable_output(), None);
        job.status = RenderStatus::Completed;
        assert_eq!(job.refinable_output(), Some("out"));
        job.rendered_image_url = None;
        assert_eq!(job.refinable_output(), None);
    }
}
