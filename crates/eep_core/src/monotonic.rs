//! Ordering checks on the EEP index table.

use tracing::warn;

use crate::config::EepConfig;
use crate::error::{EepError, Result};
use crate::track::Track;

/// Defined EEPs whose index does not exceed the previous defined EEP's.
pub fn monotonic_violations(track: &Track) -> Vec<(&'static str, usize)> {
    let defined = track.defined_eeps();
    defined
        .windows(2)
        .filter(|pair| pair[1].1 <= pair[0].1)
        .map(|pair| pair[1])
        .collect()
}

/// Flags the track if its defined EEP indices are not strictly increasing.
pub fn check_monotonic_increase(track: &mut Track) -> Result<()> {
    if track.is_flagged() {
        return Ok(());
    }
    let violations = monotonic_violations(track);
    if violations.is_empty() {
        return Ok(());
    }
    let offenders: Vec<String> = violations
        .iter()
        .map(|(name, index)| format!("{name}={index}"))
        .collect();
    warn!(
        track = %track.name,
        mass = track.mass,
        offenders = %offenders.join(", "),
        "eeps not monotonically increasing"
    );
    track.flag("eeps not monotonically increasing");
    Err(EepError::MonotonicityViolation { offenders })
}

/// Spreads apart reference EEPs that sit on, or next to, each other.
///
/// Reference points such as POINT_B have no physical meaning, so moving one a
/// sample along the track is harmless. Each pass moves one EEP toward the
/// side with more room; when the neighbours are too tight the move widens to
/// the next EEP out, and the track is flagged if even that span is narrower
/// than `repair_slack`.
pub fn check_sandros_eeps(track: &mut Track, config: &EepConfig) -> Result<()> {
    let catalogue = track.catalogue();
    let max_passes = catalogue.len() * config.repair_slack.max(1);
    for _ in 0..max_passes {
        let defined = track.defined_eeps();
        if defined.len() < 2 {
            return Ok(());
        }
        let gaps: Vec<i64> = defined
            .windows(2)
            .map(|pair| pair[1].1 as i64 - pair[0].1 as i64)
            .collect();
        let (same, &gap) = gaps
            .iter()
            .enumerate()
            .min_by_key(|(_, gap)| **gap)
            .ok_or_else(|| EepError::incomplete(track.mass, "no eep gaps"))?;
        if gap > 1 {
            return Ok(());
        }

        let isame = defined[same].1 as i64;
        let after = same + 1;
        let iafter = defined[after].1 as i64;
        let before = same.checked_sub(1);
        let ibefore = before.map_or(0, |b| defined[b].1 as i64);

        let (name, inew) = if iafter - ibefore < config.repair_min_gap as i64 {
            let earlier = before
                .and_then(|b| catalogue.ordinal(defined[b].0))
                .and_then(|o| o.checked_sub(1))
                .map_or(0, |o| track.eep_indices.get(o).copied().unwrap_or(0) as i64);
            let last = track.last_index()? as i64;
            let later = catalogue
                .ordinal(defined[after].0)
                .and_then(|o| track.eep_indices.get(o + 1).copied())
                .filter(|&i| i > 0)
                .map_or(last, |i| i as i64);
            if later - earlier < config.repair_slack as i64 {
                return unworkable(track, defined[same].0);
            }
            match before {
                Some(b) if iafter - isame >= isame - ibefore => (defined[b].0, ibefore - 1),
                _ => (defined[after].0, iafter + 1),
            }
        } else if iafter - isame < isame - ibefore {
            (defined[same].0, isame - 1)
        } else {
            (defined[same].0, isame + 1)
        };

        if inew <= 0 || inew as usize >= track.len() {
            return unworkable(track, name);
        }
        warn!(
            track = %track.name,
            eep = name,
            from = isame,
            to = inew,
            "reference eeps too close, moving one"
        );
        track.set_eep(
            name,
            inew as usize,
            format!("{} too close, moved this one away", defined[same].0),
        )?;
    }
    unworkable(track, "reference eeps")
}

fn unworkable(track: &mut Track, name: &str) -> Result<()> {
    track.flag("Track is unworkable. Check reference eeps");
    Err(EepError::MonotonicityViolation {
        offenders: vec![name.to_string()],
    })
}
