//! Output configuration validation.
//!
//! Validation runs before the filter graph is compiled and reports the first
//! violated rule only. Rules are checked per output, in list order:
//! quality, snapshot interval, scale dimensions, sprite dimensions.
//!
//! Unknown output types and scale behaviors cannot be represented by the
//! enums themselves; they are rejected while parsing (see the `FromStr`
//! impls in [`crate::config`]) with the same error kinds.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::{OutputConfig, OutputType};

/// Highest accepted `-q:v` value.
pub const MAX_QUALITY: u32 = 31;

/// Smallest accepted snapshot interval.
pub const MIN_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(1);

/// Which rule a configuration violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    NoOutputs,
    Quality,
    SnapshotInterval,
    OutputType,
    Scale,
    SpriteDimensions,
    ScaleBehavior,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationErrorKind::NoOutputs => "no outputs",
            ValidationErrorKind::Quality => "quality",
            ValidationErrorKind::SnapshotInterval => "snapshot interval",
            ValidationErrorKind::OutputType => "output type",
            ValidationErrorKind::Scale => "scale",
            ValidationErrorKind::SpriteDimensions => "sprite dimensions",
            ValidationErrorKind::ScaleBehavior => "scale behavior",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validate the full output list.
pub fn validate_outputs(outputs: &[OutputConfig]) -> Result<(), ValidationError> {
    if outputs.is_empty() {
        return Err(ValidationError::new(
            ValidationErrorKind::NoOutputs,
            "at least one output should be provided",
        ));
    }

    for (idx, output) in outputs.iter().enumerate() {
        validate_output(idx, output)?;
    }

    Ok(())
}

fn validate_output(idx: usize, output: &OutputConfig) -> Result<(), ValidationError> {
    use ValidationErrorKind as Kind;

    if output.quality > MAX_QUALITY {
        return Err(ValidationError::new(
            Kind::Quality,
            format!(
                "output {idx} has wrong quality, valid values are 1-{MAX_QUALITY}, got {}",
                output.quality
            ),
        ));
    }

    if output.snapshot_interval < MIN_SNAPSHOT_INTERVAL {
        return Err(ValidationError::new(
            Kind::SnapshotInterval,
            format!("output {idx} snapshot interval is less than one millisecond"),
        ));
    }

    let scale = &output.scale;
    if scale.width < 0 && scale.height < 0 {
        return Err(ValidationError::new(
            Kind::Scale,
            format!("output {idx} scale has both negative width and height"),
        ));
    }

    if scale.width == 0 {
        return Err(ValidationError::new(
            Kind::Scale,
            format!("output {idx} scale width cannot be zero"),
        ));
    }

    if scale.height == 0 {
        return Err(ValidationError::new(
            Kind::Scale,
            format!("output {idx} scale height cannot be zero"),
        ));
    }

    if output.output_type == OutputType::Sprites {
        if output.sprites.rows < 1 {
            return Err(ValidationError::new(
                Kind::SpriteDimensions,
                format!("output {idx} sprite rows dimension is less than 1"),
            ));
        }
        if output.sprites.columns < 1 {
            return Err(ValidationError::new(
                Kind::SpriteDimensions,
                format!("output {idx} sprite columns dimension is less than 1"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScaleBehavior, ScaleConfig, SpriteDimensions};

    fn thumbs() -> OutputConfig {
        OutputConfig::thumbs(
            Duration::from_secs(5),
            ScaleConfig::new(320, 180, ScaleBehavior::None),
        )
    }

    fn kind_of(outputs: &[OutputConfig]) -> Option<ValidationErrorKind> {
        validate_outputs(outputs).err().map(|e| e.kind)
    }

    #[test]
    fn test_empty_outputs() {
        assert_eq!(kind_of(&[]), Some(ValidationErrorKind::NoOutputs));
    }

    #[test]
    fn test_valid_output() {
        assert!(validate_outputs(&[thumbs()]).is_ok());
    }

    #[test]
    fn test_quality_bounds() {
        assert!(validate_outputs(&[thumbs().with_quality(0)]).is_ok());
        assert!(validate_outputs(&[thumbs().with_quality(1)]).is_ok());
        assert!(validate_outputs(&[thumbs().with_quality(31)]).is_ok());
        assert_eq!(
            kind_of(&[thumbs().with_quality(32)]),
            Some(ValidationErrorKind::Quality)
        );
    }

    #[test]
    fn test_snapshot_interval() {
        let mut output = thumbs();
        output.snapshot_interval = Duration::ZERO;
        let err = validate_outputs(&[output.clone()]).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::SnapshotInterval);
        assert_eq!(err.kind.to_string(), "snapshot interval");

        output.snapshot_interval = Duration::from_micros(999);
        assert_eq!(
            kind_of(&[output.clone()]),
            Some(ValidationErrorKind::SnapshotInterval)
        );

        output.snapshot_interval = Duration::from_millis(1);
        assert!(validate_outputs(&[output]).is_ok());
    }

    #[test]
    fn test_scale_rules() {
        let mut output = thumbs();

        output.scale = ScaleConfig::new(-1, -1, ScaleBehavior::None);
        let err = validate_outputs(&[output.clone()]).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Scale);
        assert!(err.message.contains("both negative"));

        output.scale = ScaleConfig::new(0, 180, ScaleBehavior::None);
        let err = validate_outputs(&[output.clone()]).unwrap_err();
        assert!(err.message.contains("width cannot be zero"));

        output.scale = ScaleConfig::new(320, 0, ScaleBehavior::None);
        let err = validate_outputs(&[output.clone()]).unwrap_err();
        assert!(err.message.contains("height cannot be zero"));

        output.scale = ScaleConfig::new(-1, 180, ScaleBehavior::None);
        assert!(validate_outputs(&[output.clone()]).is_ok());

        output.scale = ScaleConfig::new(320, -1, ScaleBehavior::None);
        assert!(validate_outputs(&[output]).is_ok());
    }

    #[test]
    fn test_sprite_dimensions() {
        let scale = ScaleConfig::new(160, 90, ScaleBehavior::None);
        let interval = Duration::from_secs(10);

        let rows_zero = OutputConfig::sprites(interval, scale, SpriteDimensions::new(5, 0));
        let err = validate_outputs(&[rows_zero]).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::SpriteDimensions);
        assert!(err.message.contains("rows"));

        let cols_zero = OutputConfig::sprites(interval, scale, SpriteDimensions::new(0, 5));
        let err = validate_outputs(&[cols_zero]).unwrap_err();
        assert!(err.message.contains("columns"));

        let single = OutputConfig::sprites(interval, scale, SpriteDimensions::new(1, 1));
        assert!(validate_outputs(&[single]).is_ok());
    }

    #[test]
    fn test_sprite_dimensions_ignored_for_thumbs() {
        let mut output = thumbs();
        output.sprites = SpriteDimensions::new(0, 0);
        assert!(validate_outputs(&[output]).is_ok());
    }

    #[test]
    fn test_priority_order() {
        // Quality is checked before the interval and the scale.
        let mut output = thumbs().with_quality(40);
        output.snapshot_interval = Duration::ZERO;
        output.scale = ScaleConfig::new(0, 0, ScaleBehavior::None);
        assert_eq!(kind_of(&[output.clone()]), Some(ValidationErrorKind::Quality));

        output.quality = 0;
        assert_eq!(
            kind_of(&[output.clone()]),
            Some(ValidationErrorKind::SnapshotInterval)
        );

        // The first invalid output wins.
        let err = validate_outputs(&[thumbs(), output]).unwrap_err();
        assert!(err.message.starts_with("output 1 "));
    }
}
