/// Round to a fixed number of decimal places for reporting stability
pub fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Square metres to hectares
pub fn square_meters_to_hectares(area_m2: f64) -> f64 {
    area_m2 / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_decimals() {
        assert_eq!(round_to_decimals(1.0 / 3.0, 4), 0.3333);
        assert_eq!(round_to_decimals(2.0 / 3.0, 4), 0.6667);
        assert_eq!(round_to_decimals(-0.123456, 2), -0.12);
        assert_eq!(round_to_decimals(12.345, 0), 12.0);
    }

    #[test]
    fn test_square_meters_to_hectares() {
        assert_eq!(square_meters_to_hectares(10_000.0), 1.0);
        assert_eq!(square_meters_to_hectares(0.0), 0.0);
    }
}
