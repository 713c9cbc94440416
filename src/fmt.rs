/// Format minor units as a dollar amount with thousands separators: $1,234.56
pub fn money(cents: i64) -> String {
    let negative = cents < 0;
    let abs = cents.unsigned_abs();
    let int_part = (abs / 100).to_string();
    let dec_part = abs % 100;

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if negative {
        format!("-${with_commas}.{dec_part:02}")
    } else {
        format!("${with_commas}.{dec_part:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(123456), "$1,234.56");
        assert_eq!(money(-50000), "-$500.00");
        assert_eq!(money(0), "$0.00");
        assert_eq!(money(100000099), "$1,000,000.99");
        assert_eq!(money(4210), "$42.10");
        assert_eq!(money(-7), "-$0.07");
    }
}
