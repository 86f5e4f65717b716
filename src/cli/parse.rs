use std::{fmt::Display, ops::RangeInclusive, str::FromStr};

pub fn parse_range_inclusive<N: PartialOrd + FromStr + Display>(
    s: &str,
    range: RangeInclusive<N>,
) -> Result<N, String> {
    let value: N = s
        .parse()
        .map_err(|_| format!("`{s}` is not a valid number"))?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(format!(
            "{value} is not in range {}-{}",
            range.start(),
            range.end(),
        ))
    }
}
