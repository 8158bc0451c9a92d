use std::str::FromStr;
use std::time::Duration;

use crate::config::ConfigError;

/// The scheduler reconciles the population roughly once per second.
const NOMINAL_TICK: Duration = Duration::from_secs(1);

/// Floor for the reconciliation tick so short stages cannot busy-loop the scheduler.
const MIN_TICK: Duration = Duration::from_millis(100);

/// One segment of a load profile.
///
/// Over `duration` the desired virtual user count moves linearly from the previous stage's target
/// (or zero at the start of the run) to `target`. A zero duration stage jumps straight to its
/// target, which is how a flat run reaches its full population immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    /// Parse a stage from the `<duration>:<target>` syntax used on the command line, for example
    /// `120s:30` or `5m:0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidStage {
            value: s.to_string(),
        };

        let (duration, target) = s.split_once(':').ok_or_else(invalid)?;
        let target = target.trim().parse::<usize>().map_err(|_| invalid())?;
        let duration = parse_duration(duration)?;

        Ok(Stage::new(duration, target))
    }
}

/// Parse a duration that must carry an explicit unit, such as `30s`, `5m` or `500ms`.
///
/// A bare number is rejected rather than defaulting to any unit. A schedule that silently treats
/// `90` as ninety seconds on one machine and ninety milliseconds on another produces load profiles
/// that look valid and are wildly wrong.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::MissingDurationUnit {
            value: s.to_string(),
        });
    }

    humantime::parse_duration(s).map_err(|_| ConfigError::InvalidDuration {
        value: s.to_string(),
    })
}

/// An ordered list of stages describing how the virtual user population changes over a run.
///
/// An empty list is a valid profile meaning no load: the schedule is exhausted from the first
/// instant and a run over it completes immediately, with a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadProfile {
    stages: Vec<Stage>,
    total: Duration,
}

impl LoadProfile {
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        let total = stages.iter().map(|s| s.duration).sum::<Duration>();
        if !stages.is_empty() && total.is_zero() {
            return Err(ConfigError::ZeroLengthProfile);
        }

        Ok(Self { stages, total })
    }

    /// A flat run, expressed as a jump to `vus` followed by a hold for `duration`.
    pub fn flat(vus: usize, duration: Duration) -> Result<Self, ConfigError> {
        Self::new(vec![
            Stage::new(Duration::ZERO, vus),
            Stage::new(duration, vus),
        ])
    }

    /// The virtual user count the scheduler should be running at `elapsed` time into the run.
    ///
    /// Within a stage the count is interpolated linearly and rounded to nearest, so at a stage
    /// boundary the count equals that stage's target exactly. Returns `None` once `elapsed` has
    /// passed the end of the schedule, which is the scheduler's signal to wind the run down.
    pub fn desired_vus(&self, elapsed: Duration) -> Option<usize> {
        if self.stages.is_empty() || elapsed > self.total {
            return None;
        }

        let mut offset = Duration::ZERO;
        let mut prev_target = 0usize;
        for stage in &self.stages {
            let end = offset + stage.duration;
            if stage.duration.is_zero() || elapsed >= end {
                offset = end;
                prev_target = stage.target;
                continue;
            }

            let progress = (elapsed - offset).as_secs_f64() / stage.duration.as_secs_f64();
            let diff = stage.target as f64 - prev_target as f64;
            return Some((prev_target as f64 + diff * progress).round() as usize);
        }

        // Exactly at the end of the schedule, hold the final target for this instant.
        Some(prev_target)
    }

    /// How often the scheduler should reconcile the population against this profile.
    ///
    /// Nominally one second. Capped at a tenth of the shortest positive stage so that short
    /// stages still get a reasonable number of reconciliation points, and floored so that very
    /// short stages cannot turn the scheduler into a busy loop.
    pub fn tick_interval(&self) -> Duration {
        let shortest = self
            .stages
            .iter()
            .map(|s| s.duration)
            .filter(|d| !d.is_zero())
            .min()
            .unwrap_or(NOMINAL_TICK);

        (shortest / 10).clamp(MIN_TICK, NOMINAL_TICK)
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// The peak virtual user count anywhere in the schedule.
    pub fn max_target(&self) -> usize {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ramp_hold_drop() -> LoadProfile {
        LoadProfile::new(vec![
            Stage::new(secs(30), 400),
            Stage::new(secs(60), 400),
            Stage::new(secs(30), 0),
        ])
        .unwrap()
    }

    #[test]
    fn interpolates_within_a_ramp() {
        let profile = ramp_hold_drop();

        assert_eq!(Some(0), profile.desired_vus(secs(0)));
        assert_eq!(Some(200), profile.desired_vus(secs(15)));
        assert_eq!(Some(400), profile.desired_vus(secs(45)));
        assert_eq!(Some(200), profile.desired_vus(secs(105)));
    }

    #[test]
    fn stage_boundaries_hit_their_targets_exactly() {
        let profile = ramp_hold_drop();

        assert_eq!(Some(400), profile.desired_vus(secs(30)));
        assert_eq!(Some(400), profile.desired_vus(secs(90)));
        assert_eq!(Some(0), profile.desired_vus(secs(120)));
    }

    #[test]
    fn schedule_is_exhausted_past_the_end() {
        let profile = ramp_hold_drop();

        assert_eq!(None, profile.desired_vus(secs(121)));
        assert_eq!(None, profile.desired_vus(secs(3600)));
    }

    #[test]
    fn interpolation_rounds_to_nearest() {
        let profile = LoadProfile::new(vec![Stage::new(secs(30), 400)]).unwrap();

        // 400 / 30 = 13.33 per second.
        assert_eq!(Some(13), profile.desired_vus(secs(1)));
        assert_eq!(Some(27), profile.desired_vus(secs(2)));
    }

    #[test]
    fn ramp_down_interpolates_toward_zero() {
        let profile = LoadProfile::new(vec![Stage::new(secs(10), 100), Stage::new(secs(10), 0)])
            .unwrap();

        assert_eq!(Some(100), profile.desired_vus(secs(10)));
        assert_eq!(Some(50), profile.desired_vus(secs(15)));
        assert_eq!(Some(10), profile.desired_vus(secs(19)));
        assert_eq!(Some(0), profile.desired_vus(secs(20)));
    }

    #[test]
    fn zero_duration_stage_jumps_immediately() {
        let profile = LoadProfile::new(vec![
            Stage::new(Duration::ZERO, 300),
            Stage::new(secs(10), 300),
        ])
        .unwrap();

        assert_eq!(Some(300), profile.desired_vus(Duration::ZERO));
        assert_eq!(Some(300), profile.desired_vus(secs(5)));
    }

    #[test]
    fn zero_duration_stage_mid_schedule_resets_the_baseline() {
        let profile = LoadProfile::new(vec![
            Stage::new(secs(10), 100),
            Stage::new(Duration::ZERO, 0),
            Stage::new(secs(10), 50),
        ])
        .unwrap();

        assert_eq!(Some(0), profile.desired_vus(secs(10)));
        assert_eq!(Some(25), profile.desired_vus(secs(15)));
    }

    #[test]
    fn flat_profile_holds_a_constant_count() {
        let profile = LoadProfile::flat(300, secs(300)).unwrap();

        assert_eq!(Some(300), profile.desired_vus(Duration::ZERO));
        assert_eq!(Some(300), profile.desired_vus(secs(150)));
        assert_eq!(Some(300), profile.desired_vus(secs(300)));
        assert_eq!(None, profile.desired_vus(secs(301)));
        assert_eq!(300, profile.max_target());
        assert_eq!(secs(300), profile.total_duration());
    }

    #[test]
    fn empty_profile_means_no_load() {
        let profile = LoadProfile::new(vec![]).unwrap();

        assert_eq!(None, profile.desired_vus(Duration::ZERO));
        assert_eq!(Duration::ZERO, profile.total_duration());
        assert_eq!(0, profile.max_target());
    }

    #[test]
    fn all_zero_duration_profile_is_rejected() {
        assert_eq!(
            Err(ConfigError::ZeroLengthProfile),
            LoadProfile::new(vec![Stage::new(Duration::ZERO, 10)])
        );
    }

    #[test]
    fn tick_interval_tracks_the_shortest_stage() {
        let long = LoadProfile::new(vec![Stage::new(secs(120), 30)]).unwrap();
        assert_eq!(secs(1), long.tick_interval());

        let short = LoadProfile::new(vec![
            Stage::new(secs(120), 30),
            Stage::new(secs(5), 0),
        ])
        .unwrap();
        assert_eq!(Duration::from_millis(500), short.tick_interval());

        let very_short = LoadProfile::new(vec![Stage::new(Duration::from_millis(200), 10)])
            .unwrap();
        assert_eq!(Duration::from_millis(100), very_short.tick_interval());
    }

    #[test]
    fn parses_stage_syntax() {
        assert_eq!(
            Ok(Stage::new(secs(120), 30)),
            "120s:30".parse::<Stage>()
        );
        assert_eq!(Ok(Stage::new(secs(300), 0)), "5m:0".parse::<Stage>());
        assert_eq!(
            Ok(Stage::new(Duration::from_millis(500), 7)),
            "500ms:7".parse::<Stage>()
        );
    }

    #[test]
    fn rejects_malformed_stages() {
        assert_eq!(
            Err(ConfigError::InvalidStage {
                value: "30s".to_string()
            }),
            "30s".parse::<Stage>()
        );
        assert_eq!(
            Err(ConfigError::InvalidStage {
                value: "30s:lots".to_string()
            }),
            "30s:lots".parse::<Stage>()
        );
        assert_eq!(
            Err(ConfigError::InvalidStage {
                value: "30s:-1".to_string()
            }),
            "30s:-1".parse::<Stage>()
        );
    }

    #[test]
    fn rejects_durations_without_units() {
        assert_eq!(
            Err(ConfigError::MissingDurationUnit {
                value: "90".to_string()
            }),
            parse_duration("90")
        );
        assert_eq!(
            Err(ConfigError::MissingDurationUnit {
                value: "90".to_string()
            }),
            "90:10".parse::<Stage>()
        );
    }

    #[test]
    fn rejects_garbage_durations() {
        assert_eq!(
            Err(ConfigError::InvalidDuration {
                value: "soon".to_string()
            }),
            parse_duration("soon")
        );
        assert_eq!(
            Err(ConfigError::InvalidDuration {
                value: "".to_string()
            }),
            parse_duration("")
        );
    }
}
