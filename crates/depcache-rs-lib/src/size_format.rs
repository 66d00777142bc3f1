//! Human readable sizes.

const UNITS: [&str; 9] = ["", "k", "M", "G", "T", "P", "E", "Z", "Y"];

/// Formats a byte count into a short string such as `"512 B"` or `"12.3 kB"`.
///
/// Units step by 1000. Values below 100 of any unit above bytes get one decimal place,
/// anything under 10000 is printed without decimals before moving to the next unit.
pub fn size_to_string(size: f64) -> String {
	let sign = if size < 0.0 { "-" } else { "" };
	let mut size = size.abs();

	for (i, unit) in UNITS.iter().enumerate() {
		if size < 100.0 && i != 0 {
			return format!("{}{:.1} {}B", sign, size, unit);
		}
		if size < 10000.0 || i == UNITS.len() - 1 {
			return format!("{}{:.0} {}B", sign, size, unit);
		}
		size /= 1000.0;
	}
	unreachable!("the last unit always returns")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test] fn bytes_have_no_decimals() { assert_eq!(size_to_string(512.0), "512 B") }
	#[test] fn zero() { assert_eq!(size_to_string(0.0), "0 B") }
	#[test] fn bytes_up_to_four_digits() { assert_eq!(size_to_string(9999.0), "9999 B") }
	#[test] fn small_kilobytes_have_one_decimal() { assert_eq!(size_to_string(12345.0), "12.3 kB") }
	#[test] fn large_kilobytes_are_whole() { assert_eq!(size_to_string(123456.0), "123 kB") }
	#[test] fn four_digit_kilobytes() { assert_eq!(size_to_string(1234000.0), "1234 kB") }
	#[test] fn megabytes() { assert_eq!(size_to_string(42_000_000.0), "42.0 MB") }
	#[test] fn negative_keeps_sign() { assert_eq!(size_to_string(-12345.0), "-12.3 kB") }
	#[test] fn huge_values_stay_in_yottabytes() { assert!(size_to_string(1e30).ends_with(" YB")) }
}
