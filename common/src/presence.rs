/// Readings at or below this value are too weak to count as someone nearby.
pub const PRESENCE_RSSI_THRESHOLD: i32 = -30;

pub fn is_present(reading: Option<i32>) -> bool {
    matches!(reading, Some(rssi) if rssi > PRESENCE_RSSI_THRESHOLD)
}

/// Number of readings that indicate a device close enough to be present.
/// Unreachable devices (`None`) simply do not count.
pub fn count_present<I>(readings: I) -> usize
where
    I: IntoIterator<Item = Option<i32>>,
{
    readings.into_iter().filter(|reading| is_present(*reading)).count()
}
