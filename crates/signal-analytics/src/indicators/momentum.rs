//! 모멘텀 지표 (RSI).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const HUNDRED: Decimal = dec!(100);
const NEUTRAL: Decimal = dec!(50);

/// 상대강도지수 (Wilder 평활).
///
/// 첫 `period`개 변화량의 단순 평균으로 시드한 뒤, 이후 변화량마다
/// `avg = (avg * (period - 1) + current) / period`로 평활하고 값을 하나씩 냅니다.
/// 따라서 출력 길이는 `data.len() - period - 1`이고, 최소 `period + 2`개의
/// 가격이 있어야 값이 나옵니다.
///
/// 평균 손실이 0이면 평균 이익이 양수일 때 100, 둘 다 0이면 50입니다.
pub fn rsi(data: &[Decimal], period: usize) -> Vec<Decimal> {
    if period == 0 || data.len() < period + 2 {
        return Vec::new();
    }

    let deltas: Vec<Decimal> = data.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |d: &Decimal| (*d).max(Decimal::ZERO);
    let loss = |d: &Decimal| (-*d).max(Decimal::ZERO);

    let p = Decimal::from(period);
    let p_minus_one = Decimal::from(period - 1);

    let mut avg_gain = deltas[..period].iter().map(gain).sum::<Decimal>() / p;
    let mut avg_loss = deltas[..period].iter().map(loss).sum::<Decimal>() / p;

    deltas[period..]
        .iter()
        .map(|d| {
            avg_gain = (avg_gain * p_minus_one + gain(d)) / p;
            avg_loss = (avg_loss * p_minus_one + loss(d)) / p;
            rsi_value(avg_gain, avg_loss)
        })
        .collect()
}

fn rsi_value(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    if avg_loss.is_zero() {
        return if avg_gain.is_zero() { NEUTRAL } else { HUNDRED };
    }
    let rs = avg_gain / avg_loss;
    HUNDRED - HUNDRED / (Decimal::ONE + rs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prices() -> Vec<Decimal> {
        vec![
            dec!(44.34),
            dec!(44.09),
            dec!(44.15),
            dec!(43.61),
            dec!(44.33),
            dec!(44.83),
            dec!(45.10),
            dec!(45.42),
            dec!(45.84),
            dec!(46.08),
            dec!(45.89),
            dec!(46.03),
            dec!(45.61),
            dec!(46.28),
            dec!(46.28),
            dec!(46.00),
            dec!(46.03),
            dec!(46.41),
            dec!(46.22),
            dec!(45.64),
        ]
    }

    #[test]
    fn test_rsi_length() {
        let prices = sample_prices();
        let result = rsi(&prices, 14);

        assert_eq!(result.len(), prices.len() - 14 - 1);
    }

    #[test]
    fn test_rsi_needs_period_plus_two() {
        let constant = vec![dec!(100); 30];

        assert!(rsi(&constant[..15], 14).is_empty());
        assert_eq!(rsi(&constant[..16], 14).len(), 1);
    }

    #[test]
    fn test_rsi_range() {
        for value in rsi(&sample_prices(), 5) {
            assert!(value >= Decimal::ZERO && value <= HUNDRED, "rsi={}", value);
        }
    }

    #[test]
    fn test_rsi_zero_loss_convention() {
        let rising: Vec<Decimal> = (1..=20).map(Decimal::from).collect();
        assert!(rsi(&rising, 14).iter().all(|v| *v == HUNDRED));

        let flat = vec![dec!(7); 20];
        assert!(rsi(&flat, 14).iter().all(|v| *v == NEUTRAL));
    }

    #[test]
    fn test_rsi_falling_series_is_zero() {
        let falling: Vec<Decimal> = (1..=20).rev().map(Decimal::from).collect();
        assert!(rsi(&falling, 14).iter().all(|v| v.is_zero()));
    }
}
