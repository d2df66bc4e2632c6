/// Values below this magnitude get extra decimal places.
const SMALL_AMOUNT: f64 = 0.0001;

/// Renders an amount with up to 4 decimals (8 for tiny values), trailing zeros
/// trimmed and the integer part grouped by thousands.
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = if value.abs() < SMALL_AMOUNT {
        format!("{value:.8}")
    } else {
        format!("{value:.4}")
    };
    let trimmed = trim_fraction(&fixed);
    let (int_part, fraction) = match trimmed.split_once('.') {
        Some((int_part, fraction)) => (int_part, Some(fraction)),
        None => (trimmed, None),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", int_part),
    };
    let grouped = group_thousands(digits);
    let sign = if grouped == "0" && fraction.is_none() { "" } else { sign };
    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
