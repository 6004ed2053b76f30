//! DURATION value parsing (`P[nW][nD][T[nH][nM][nS]]`).

pub const MS_PER_SECOND: i64 = 1_000;
pub const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
pub const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
pub const MS_PER_WEEK: i64 = 7 * MS_PER_DAY;

/// Parse a duration into milliseconds.
///
/// Returns `None` for anything outside the grammar: a bare `P`, a `T` without
/// a time component, digits without a unit, units in the wrong section, or any
/// other character.
pub fn parse_duration(input: &str) -> Option<i64> {
    let body = input.trim().strip_prefix('P')?;

    let mut total: i64 = 0;
    let mut pending: Option<i64> = None;
    let mut in_time = false;
    let mut date_components = 0;
    let mut time_components = 0;

    for c in body.chars() {
        let unit = match c {
            '0'..='9' => {
                let digit = i64::from(c.to_digit(10)?);
                pending = Some(pending.unwrap_or(0).checked_mul(10)?.checked_add(digit)?);
                continue;
            }
            'T' => {
                if in_time || pending.is_some() {
                    return None;
                }
                in_time = true;
                continue;
            }
            'W' if !in_time => MS_PER_WEEK,
            'D' if !in_time => MS_PER_DAY,
            'H' if in_time => MS_PER_HOUR,
            'M' if in_time => MS_PER_MINUTE,
            'S' if in_time => MS_PER_SECOND,
            _ => return None,
        };

        let amount = pending.take()?;
        total = total.checked_add(amount.checked_mul(unit)?)?;
        if in_time {
            time_components += 1;
        } else {
            date_components += 1;
        }
    }

    if pending.is_some() || (in_time && time_components == 0) {
        return None;
    }
    if date_components + time_components == 0 {
        return None;
    }

    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_hours_and_minutes() {
        assert_eq!(parse_duration("PT1H30M"), Some(5_400_000));
    }

    #[test]
    fn test_parse_duration_week() {
        assert_eq!(parse_duration("P1W"), Some(604_800_000));
    }

    #[test]
    fn test_parse_duration_mixed() {
        assert_eq!(
            parse_duration("P1DT2H3M4S"),
            Some(MS_PER_DAY + 2 * MS_PER_HOUR + 3 * MS_PER_MINUTE + 4 * MS_PER_SECOND)
        );
        assert_eq!(parse_duration("PT45S"), Some(45_000));
        assert_eq!(parse_duration("P2D"), Some(2 * MS_PER_DAY));
        assert_eq!(parse_duration("PT0S"), Some(0));
    }

    #[test]
    fn test_parse_duration_surrounding_whitespace() {
        assert_eq!(parse_duration("  PT15M "), Some(15 * MS_PER_MINUTE));
    }

    #[test]
    fn test_parse_duration_bare_p_is_invalid() {
        assert_eq!(parse_duration("P"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_duration_trailing_digits_are_invalid() {
        assert_eq!(parse_duration("PT1H3"), None);
        assert_eq!(parse_duration("P1"), None);
    }

    #[test]
    fn test_parse_duration_empty_time_section_is_invalid() {
        assert_eq!(parse_duration("PT"), None);
        assert_eq!(parse_duration("P1DT"), None);
    }

    #[test]
    fn test_parse_duration_repeated_separator_is_invalid() {
        assert_eq!(parse_duration("PT1HT2M"), None);
    }

    #[test]
    fn test_parse_duration_units_in_wrong_section() {
        // M before T would be months, which the grammar does not allow
        assert_eq!(parse_duration("P1M"), None);
        assert_eq!(parse_duration("PT1D"), None);
        assert_eq!(parse_duration("P1H"), None);
    }

    #[test]
    fn test_parse_duration_rejects_foreign_characters() {
        assert_eq!(parse_duration("PT1.5H"), None);
        assert_eq!(parse_duration("pt1h"), None);
        assert_eq!(parse_duration("-PT1H"), None);
        assert_eq!(parse_duration("PTH"), None);
        assert_eq!(parse_duration("P1Y"), None);
    }

    #[test]
    fn test_parse_duration_overflow_is_invalid() {
        assert_eq!(parse_duration("P99999999999999999999W"), None);
        assert_eq!(parse_duration("P9999999999999W"), None);
    }
}
