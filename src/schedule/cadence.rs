use anyhow::{Result, bail};

pub const SENTINEL_THRESHOLD: i64 = -1;
pub const DEFAULT_SNAP_THRESHOLD_SECS: i64 = 60;
pub const DEFAULT_MIN_SNAP_MS: u64 = 200;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CadenceBand {
    pub threshold_secs: i64,
    pub interval_ms: u64,
}

impl CadenceBand {
    pub const fn new(threshold_secs: i64, interval_ms: u64) -> Self {
        Self {
            threshold_secs,
            interval_ms,
        }
    }
}

pub const DEFAULT_BANDS: [CadenceBand; 9] = [
    CadenceBand::new(3_600, 600_000),
    CadenceBand::new(1_800, 300_000),
    CadenceBand::new(900, 60_000),
    CadenceBand::new(600, 30_000),
    CadenceBand::new(300, 15_000),
    CadenceBand::new(120, 10_000),
    CadenceBand::new(60, 5_000),
    CadenceBand::new(30, 2_000),
    CadenceBand::new(SENTINEL_THRESHOLD, 1_000),
];

/// Ordered by descending threshold and terminated by the `-1` sentinel, so a
/// lookup always finds a band.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CadenceTable {
    bands: Vec<CadenceBand>,
}

impl Default for CadenceTable {
    fn default() -> Self {
        Self {
            bands: DEFAULT_BANDS.to_vec(),
        }
    }
}

impl CadenceTable {
    pub fn new(bands: Vec<CadenceBand>) -> Result<Self> {
        let Some(last) = bands.last() else {
            bail!("cadence table must contain at least the sentinel band");
        };
        if last.threshold_secs != SENTINEL_THRESHOLD {
            bail!(
                "cadence table must end with a sentinel band (threshold_secs {SENTINEL_THRESHOLD})"
            );
        }
        let sentinels = bands
            .iter()
            .filter(|band| band.threshold_secs == SENTINEL_THRESHOLD)
            .count();
        if sentinels != 1 {
            bail!("cadence table must contain exactly one sentinel band, found {sentinels}");
        }
        for band in &bands {
            if band.interval_ms == 0 {
                bail!(
                    "cadence band with threshold_secs {} must have interval_ms > 0",
                    band.threshold_secs
                );
            }
            if band.threshold_secs < SENTINEL_THRESHOLD {
                bail!(
                    "cadence band threshold_secs {} is below the sentinel",
                    band.threshold_secs
                );
            }
        }
        for pair in bands.windows(2) {
            if pair[0].threshold_secs <= pair[1].threshold_secs {
                bail!(
                    "cadence bands must be ordered by strictly descending threshold_secs ({} then {})",
                    pair[0].threshold_secs,
                    pair[1].threshold_secs
                );
            }
        }
        Ok(Self { bands })
    }

    #[cfg(test)]
    pub fn bands(&self) -> &[CadenceBand] {
        &self.bands
    }

    /// Interval of the first band whose threshold is strictly below `remaining_secs`.
    pub fn select_interval(&self, remaining_secs: i64) -> u64 {
        self.bands
            .iter()
            .find(|band| band.threshold_secs < remaining_secs)
            .or_else(|| self.bands.last())
            .map(|band| band.interval_ms)
            .unwrap_or(DEFAULT_BANDS[DEFAULT_BANDS.len() - 1].interval_ms)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CadenceConfig {
    pub table: CadenceTable,
    pub snap_threshold_secs: i64,
    pub min_snap_ms: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            table: CadenceTable::default(),
            snap_threshold_secs: DEFAULT_SNAP_THRESHOLD_SECS,
            min_snap_ms: DEFAULT_MIN_SNAP_MS,
        }
    }
}

impl CadenceConfig {
    pub fn select_interval(&self, remaining_secs: i64) -> u64 {
        self.table.select_interval(remaining_secs)
    }

    pub fn next_interval(&self, remaining_secs: i64) -> u64 {
        next_interval_with_snap(
            &self.table,
            remaining_secs,
            self.snap_threshold_secs,
            self.min_snap_ms,
        )
    }
}

/// Picks the next delay so the following tick lands on a multiple of the
/// plain cadence. Never returns more than `select_interval(remaining_secs)`.
pub fn next_interval_with_snap(
    table: &CadenceTable,
    remaining_secs: i64,
    snap_threshold_secs: i64,
    min_snap_ms: u64,
) -> u64 {
    let base = table.select_interval(remaining_secs);
    if remaining_secs < snap_threshold_secs {
        return base;
    }

    // Truncating division: every default band is a whole number of seconds.
    let cadence_secs = (base / 1_000).max(1);
    let phase = remaining_secs.rem_euclid(cadence_secs as i64) as u64;
    if phase == 0 {
        return base;
    }

    let mut snap_ms = phase * 1_000;
    if snap_ms < min_snap_ms {
        snap_ms += cadence_secs * 1_000;
    }
    if snap_ms < base { snap_ms } else { base }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(remaining: i64) -> u64 {
        CadenceConfig::default().next_interval(remaining)
    }

    #[test]
    fn default_table_is_valid() {
        let table = CadenceTable::new(DEFAULT_BANDS.to_vec()).expect("default bands");
        assert_eq!(table, CadenceTable::default());
    }

    #[test]
    fn select_interval_follows_the_bands() {
        let table = CadenceTable::default();
        assert_eq!(table.select_interval(86_400), 600_000);
        assert_eq!(table.select_interval(3_601), 600_000);
        assert_eq!(table.select_interval(3_600), 300_000);
        assert_eq!(table.select_interval(1_801), 300_000);
        assert_eq!(table.select_interval(1_800), 60_000);
        assert_eq!(table.select_interval(901), 60_000);
        assert_eq!(table.select_interval(601), 30_000);
        assert_eq!(table.select_interval(301), 15_000);
        assert_eq!(table.select_interval(121), 10_000);
        assert_eq!(table.select_interval(61), 5_000);
        assert_eq!(table.select_interval(60), 2_000);
        assert_eq!(table.select_interval(31), 2_000);
        assert_eq!(table.select_interval(30), 1_000);
        assert_eq!(table.select_interval(1), 1_000);
        assert_eq!(table.select_interval(0), 1_000);
    }

    #[test]
    fn everything_above_an_hour_uses_ten_minutes() {
        let table = CadenceTable::default();
        for remaining in (3_601..400_000).step_by(997) {
            assert_eq!(table.select_interval(remaining), 600_000, "{remaining}");
        }
    }

    #[test]
    fn snap_never_exceeds_plain_cadence() {
        let config = CadenceConfig::default();
        for remaining in 0..8_000 {
            assert!(
                snap(remaining) <= config.select_interval(remaining),
                "{remaining}"
            );
        }
    }

    #[test]
    fn snap_is_a_no_op_below_threshold() {
        let config = CadenceConfig::default();
        for remaining in 0..DEFAULT_SNAP_THRESHOLD_SECS {
            assert_eq!(snap(remaining), config.select_interval(remaining));
        }
    }

    #[test]
    fn seventy_five_minutes_snaps_to_the_seventy_minute_mark() {
        assert_eq!(snap(4_500), 300_000);
        assert_eq!(snap(4_200), 600_000);
    }

    #[test]
    fn aligned_remaining_keeps_the_base_interval() {
        assert_eq!(snap(7_200), 600_000);
        assert_eq!(snap(1_200), 60_000);
        assert_eq!(snap(120), 5_000);
    }

    #[test]
    fn tiny_snaps_are_pushed_out_by_a_full_cadence() {
        let table = CadenceTable::new(vec![
            CadenceBand::new(60, 1_000),
            CadenceBand::new(SENTINEL_THRESHOLD, 1_000),
        ])
        .expect("table");
        // 1s cadence always has phase 0.
        assert_eq!(next_interval_with_snap(&table, 90, 60, 200), 1_000);

        let coarse = CadenceTable::new(vec![
            CadenceBand::new(60, 10_000),
            CadenceBand::new(SENTINEL_THRESHOLD, 1_000),
        ])
        .expect("table");
        // phase 1s is below a 1500ms minimum, so a full cadence is added and
        // the result (11s) is no longer shorter than the base.
        assert_eq!(next_interval_with_snap(&coarse, 91, 60, 1_500), 10_000);
        assert_eq!(next_interval_with_snap(&coarse, 93, 60, 1_500), 3_000);
    }

    #[test]
    fn sub_second_cadence_truncates_to_one_second() {
        let table = CadenceTable::new(vec![CadenceBand::new(SENTINEL_THRESHOLD, 500)])
            .expect("table");
        assert_eq!(next_interval_with_snap(&table, 100, 60, 200), 500);
    }

    #[test]
    fn invalid_tables_are_rejected() {
        let missing_sentinel = CadenceTable::new(vec![CadenceBand::new(60, 1_000)]);
        assert!(missing_sentinel.is_err());

        let unordered = CadenceTable::new(vec![
            CadenceBand::new(30, 1_000),
            CadenceBand::new(60, 1_000),
            CadenceBand::new(SENTINEL_THRESHOLD, 1_000),
        ]);
        assert!(
            unordered
                .expect_err("unordered")
                .to_string()
                .contains("descending")
        );

        let zero_interval = CadenceTable::new(vec![
            CadenceBand::new(60, 0),
            CadenceBand::new(SENTINEL_THRESHOLD, 1_000),
        ]);
        assert!(zero_interval.is_err());

        let two_sentinels = CadenceTable::new(vec![
            CadenceBand::new(SENTINEL_THRESHOLD, 2_000),
            CadenceBand::new(SENTINEL_THRESHOLD, 1_000),
        ]);
        assert!(two_sentinels.is_err());

        assert!(CadenceTable::new(Vec::new()).is_err());
    }
}
