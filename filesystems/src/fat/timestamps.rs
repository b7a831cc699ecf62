// FAT date/time handling
// FAT dates count years from 1980; times have two-second resolution.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};

/// Pack a timestamp into FAT (date, time) words.
///
/// Dates outside 1980..=2107 cannot be represented and encode as zero.
pub fn encode_fat_datetime(dt: &NaiveDateTime) -> (u16, u16) {
    let year = dt.year();
    if !(1980..=2107).contains(&year) {
        return (0, 0);
    }

    let date = ((year - 1980) as u16) << 9 | (dt.month() as u16) << 5 | dt.day() as u16;
    let time = (dt.hour() as u16) << 11 | (dt.minute() as u16) << 5 | (dt.second() as u16 / 2);
    (date, time)
}

/// Unpack FAT (date, time) words. Returns `None` for the zero date or any
/// field combination that does not name a real instant.
pub fn decode_fat_datetime(date: u16, time: u16) -> Option<NaiveDateTime> {
    if date == 0 {
        return None;
    }

    let year = ((date >> 9) & 0x7F) as i32 + 1980;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;

    let hour = ((time >> 11) & 0x1F) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) * 2) as u32;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// The current local time in FAT (date, time) form.
pub fn now_fat_datetime() -> (u16, u16) {
    encode_fat_datetime(&Local::now().naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(14, 30, 22)
            .unwrap();
        let (date, time) = encode_fat_datetime(&dt);
        assert_eq!(decode_fat_datetime(date, time), Some(dt));
    }

    #[test]
    fn test_two_second_resolution() {
        let dt = NaiveDate::from_ymd_opt(2020, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 31)
            .unwrap();
        let (date, time) = encode_fat_datetime(&dt);
        let decoded = decode_fat_datetime(date, time).unwrap();
        assert_eq!(decoded.second(), 30);
    }

    #[test]
    fn test_epoch_packing() {
        let dt = NaiveDate::from_ymd_opt(1980, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let (date, time) = encode_fat_datetime(&dt);
        assert_eq!(date, (1 << 5) | 1);
        assert_eq!(time, 0);
    }

    #[test]
    fn test_out_of_range_encodes_zero() {
        let dt = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(encode_fat_datetime(&dt), (0, 0));
    }

    #[test]
    fn test_zero_date_decodes_none() {
        assert_eq!(decode_fat_datetime(0, 0), None);
    }

    #[test]
    fn test_invalid_fields_decode_none() {
        // Month 15 does not exist
        let date = (44 << 9) | (15 << 5) | 1;
        assert_eq!(decode_fat_datetime(date, 0), None);
    }
}
