//! Segment planning, seed, and credit cost arithmetic.
//!
//! A generation request of `d` seconds is cut into `ceil(d / 8)` segments of
//! eight seconds each, capped at three segments, and costs one credit per
//! segment. These rules are the billing contract, so they live here rather
//! than in any one service.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::segment::Segment;

/// Length of a single generated segment in seconds.
pub const SEGMENT_SECONDS: u32 = 8;

/// Maximum number of segments per video.
pub const MAX_SEGMENTS: u32 = 3;

/// Maximum requested duration in seconds (`MAX_SEGMENTS * SEGMENT_SECONDS`).
pub const MAX_DURATION_SECONDS: u32 = MAX_SEGMENTS * SEGMENT_SECONDS;

/// Inclusive lower bound of the generation seed range.
pub const SEED_MIN: u32 = 10_000;

/// Inclusive upper bound of the generation seed range.
pub const SEED_MAX: u32 = 99_999;

/// Invalid generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationParamError {
    #[error("duration must be at least 1 second")]
    ZeroDuration,

    #[error("duration of {0}s exceeds the maximum of {MAX_DURATION_SECONDS}s")]
    DurationTooLong(u32),

    #[error("seed {0} is outside the allowed range {SEED_MIN}..={SEED_MAX}")]
    SeedOutOfRange(u32),
}

/// Number of segments needed for a requested duration.
pub fn segment_count_for_duration(duration_seconds: u32) -> Result<u32, GenerationParamError> {
    if duration_seconds == 0 {
        return Err(GenerationParamError::ZeroDuration);
    }
    if duration_seconds > MAX_DURATION_SECONDS {
        return Err(GenerationParamError::DurationTooLong(duration_seconds));
    }
    Ok(duration_seconds.div_ceil(SEGMENT_SECONDS))
}

/// Credit cost of a generation: one credit per segment.
pub fn credits_for_duration(duration_seconds: u32) -> Result<u32, GenerationParamError> {
    segment_count_for_duration(duration_seconds)
}

/// Validate a caller-supplied seed.
pub fn validate_seed(seed: u32) -> Result<(), GenerationParamError> {
    if !(SEED_MIN..=SEED_MAX).contains(&seed) {
        return Err(GenerationParamError::SeedOutOfRange(seed));
    }
    Ok(())
}

/// Draw a seed in `SEED_MIN..=SEED_MAX` from the system clock.
///
/// Seeds only need to vary between requests, not be unpredictable, so the
/// nanosecond clock is enough and avoids an RNG dependency.
pub fn random_seed() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    SEED_MIN + nanos % (SEED_MAX - SEED_MIN + 1)
}

/// The segment layout of one generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    /// Duration the user asked for.
    pub requested_seconds: u32,
    /// Number of 8-second segments to render.
    pub segment_count: u32,
}

impl SegmentPlan {
    /// Plan the segments for a requested duration.
    pub fn for_duration(duration_seconds: u32) -> Result<Self, GenerationParamError> {
        Ok(Self {
            requested_seconds: duration_seconds,
            segment_count: segment_count_for_duration(duration_seconds)?,
        })
    }

    /// Credit cost of this plan.
    pub fn credits(&self) -> u32 {
        self.segment_count
    }

    /// Length of the finished video. Durations round up to whole segments.
    pub fn total_seconds(&self) -> u32 {
        self.segment_count * SEGMENT_SECONDS
    }

    /// Whether the finished video needs the merge step.
    pub fn needs_merge(&self) -> bool {
        self.segment_count > 1
    }

    /// Build the initial segment records, all carrying the base prompt until
    /// per-segment prompts arrive.
    pub fn build_segments(&self, base_prompt: &str) -> Vec<Segment> {
        (0..self.segment_count)
            .map(|index| Segment::new(index, base_prompt))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_count_rounds_up() {
        assert_eq!(segment_count_for_duration(1).unwrap(), 1);
        assert_eq!(segment_count_for_duration(8).unwrap(), 1);
        assert_eq!(segment_count_for_duration(9).unwrap(), 2);
        assert_eq!(segment_count_for_duration(16).unwrap(), 2);
        assert_eq!(segment_count_for_duration(17).unwrap(), 3);
        assert_eq!(segment_count_for_duration(24).unwrap(), 3);
    }

    #[test]
    fn test_segment_count_rejects_zero() {
        assert_eq!(
            segment_count_for_duration(0),
            Err(GenerationParamError::ZeroDuration)
        );
    }

    #[test]
    fn test_segment_count_rejects_over_max() {
        assert_eq!(
            segment_count_for_duration(25),
            Err(GenerationParamError::DurationTooLong(25))
        );
    }

    #[test]
    fn test_segment_count_never_exceeds_max() {
        for d in 1..=MAX_DURATION_SECONDS {
            assert!(segment_count_for_duration(d).unwrap() <= MAX_SEGMENTS);
        }
    }

    #[test]
    fn test_credits_match_segment_count() {
        for d in 1..=MAX_DURATION_SECONDS {
            assert_eq!(
                credits_for_duration(d).unwrap(),
                segment_count_for_duration(d).unwrap()
            );
        }
    }

    #[test]
    fn test_seed_validation() {
        assert!(validate_seed(SEED_MIN).is_ok());
        assert!(validate_seed(SEED_MAX).is_ok());
        assert!(validate_seed(54_321).is_ok());
        assert_eq!(
            validate_seed(9_999),
            Err(GenerationParamError::SeedOutOfRange(9_999))
        );
        assert_eq!(
            validate_seed(100_000),
            Err(GenerationParamError::SeedOutOfRange(100_000))
        );
        assert_eq!(
            validate_seed(0),
            Err(GenerationParamError::SeedOutOfRange(0))
        );
    }

    #[test]
    fn test_random_seed_in_range() {
        for _ in 0..1000 {
            let seed = random_seed();
            assert!((SEED_MIN..=SEED_MAX).contains(&seed), "seed {} out of range", seed);
        }
    }

    #[test]
    fn test_plan_for_duration() {
        let plan = SegmentPlan::for_duration(20).unwrap();
        assert_eq!(plan.segment_count, 3);
        assert_eq!(plan.credits(), 3);
        assert_eq!(plan.total_seconds(), 24);
        assert!(plan.needs_merge());
    }

    #[test]
    fn test_single_segment_plan_skips_merge() {
        let plan = SegmentPlan::for_duration(8).unwrap();
        assert_eq!(plan.segment_count, 1);
        assert!(!plan.needs_merge());
    }

    #[test]
    fn test_build_segments_carries_base_prompt() {
        let plan = SegmentPlan::for_duration(24).unwrap();
        let segments = plan.build_segments("spinning sneaker on white backdrop");
        assert_eq!(segments.len(), 3);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i as u32);
            assert_eq!(segment.prompt, "spinning sneaker on white backdrop");
        }
    }
}
