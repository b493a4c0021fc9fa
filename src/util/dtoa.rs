//! Number to string conversion
//!
//! Formats doubles the way ECMA-262 9.8.1 prescribes, using the shortest
//! digit string that round-trips.

/// Shortest round-trip decimal digits of a finite positive double
///
/// Returns `(digits, n)` with the value equal to `0.digits × 10^n`.
fn shortest_digits(d: f64) -> (String, i32) {
    // `{:e}` prints the shortest round-trip mantissa, e.g. "1.2345e-7"
    let formatted = format!("{:e}", d);
    let (mantissa, exp) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = digits.trim_end_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    let exp: i32 = exp.parse().unwrap_or(0);
    (digits.to_string(), exp + 1)
}

/// ECMA-262 ToString applied to a Number
pub fn number_to_string(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d == 0.0 {
        return "0".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if d < 0.0 {
        return format!("-{}", number_to_string(-d));
    }

    let (digits, n) = shortest_digits(d);
    let k = digits.len() as i32;
    if k <= n && n <= 21 {
        let mut s = digits;
        s.extend(std::iter::repeat_n('0', (n - k) as usize));
        s
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{}.{}", int, frac)
    } else if -6 < n && n <= 0 {
        format!("0.{}{}", "0".repeat((-n) as usize), digits)
    } else {
        let e = n - 1;
        let sign = if e < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{}e{}{}", first, sign, e.abs())
        } else {
            format!("{}.{}e{}{}", first, rest, sign, e.abs())
        }
    }
}

/// Digits of `val` in `radix` (2-36), lower case
pub fn u64_to_str_radix(mut val: u64, radix: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    debug_assert!((2..=36).contains(&radix));
    if val == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while val > 0 {
        buf.push(DIGITS[(val % radix as u64) as usize]);
        val /= radix as u64;
    }
    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(number_to_string(0.0), "0");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(42.0), "42");
        assert_eq!(number_to_string(-123.0), "-123");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e20), "100000000000000000000");
        assert_eq!(number_to_string(4294967295.0), "4294967295");
    }

    #[test]
    fn test_fractions() {
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(1.25), "1.25");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(0.000001), "0.000001");
        assert_eq!(number_to_string(0.0000001), "1e-7");
        assert_eq!(number_to_string(1.5e-10), "1.5e-10");
        assert_eq!(number_to_string(123456789.125), "123456789.125");
    }

    #[test]
    fn test_special() {
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(f64::MAX), "1.7976931348623157e+308");
        assert_eq!(number_to_string(5e-324), "5e-324");
    }

    #[test]
    fn test_radix() {
        assert_eq!(u64_to_str_radix(255, 16), "ff");
        assert_eq!(u64_to_str_radix(255, 2), "11111111");
        assert_eq!(u64_to_str_radix(35, 36), "z");
        assert_eq!(u64_to_str_radix(0, 10), "0");
    }
}
