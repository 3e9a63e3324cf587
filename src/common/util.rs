// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::time::Duration;

const BYTE_UNITS: &[u8] = b"KMGTPE";

/// Render a byte count with a binary unit, e.g. `1.50 MB` or `1_024.00 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp + 1 < BYTE_UNITS.len() {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!(
        "{} {}B",
        format_large_number(bytes as f64 / div as f64),
        BYTE_UNITS[exp] as char
    )
}

/// Two decimals with `_` grouping of the integer part: `1234567.891` -> `1_234_567.89`.
pub fn format_large_number(n: f64) -> String {
    let rendered = format!("{n:.2}");
    let (int_part, dec_part) = rendered.split_once('.').unwrap_or((rendered.as_str(), "00"));
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('_');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}.{dec_part}")
}

/// Millisecond-rounded seconds, as printed in run timing logs.
pub fn format_duration(d: Duration) -> String {
    format!("{:.3}s", d.as_millis() as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_sizes_stay_in_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
    }

    #[test]
    fn sizes_pick_the_largest_whole_unit() {
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536 * 1024), "1.50 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn large_numbers_are_grouped_by_thousands() {
        assert_eq!(format_large_number(1234567.891), "1_234_567.89");
        assert_eq!(format_large_number(999.0), "999.00");
        assert_eq!(format_large_number(-1000.5), "-1_000.50");
    }

    #[test]
    fn durations_round_to_milliseconds() {
        assert_eq!(format_duration(Duration::from_micros(1_234_567)), "1.234s");
    }
}
