//! 변동성 지표 (볼린저 밴드).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{IndicatorError, IndicatorResult};

/// 볼린저 밴드 한 지점.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BollingerBand {
    /// 상단 밴드 (MA + k × σ)
    pub upper: Decimal,
    /// 중간 밴드 (이동평균)
    pub middle: Decimal,
    /// 하단 밴드 (MA - k × σ)
    pub lower: Decimal,
}

impl BollingerBand {
    /// 밴드 폭 ((상단 - 하단) / 중간).
    pub fn bandwidth(&self) -> Option<Decimal> {
        if self.middle.is_zero() {
            None
        } else {
            Some((self.upper - self.lower) / self.middle)
        }
    }
}

/// 볼린저 밴드.
///
/// 길이 `period`의 구간마다 평균과 모표준편차를 구합니다. 출력 길이는
/// `data.len() - period + 1`이고, 입력이 짧거나 `period == 0`이면 비어 있습니다.
pub fn bollinger_bands(
    data: &[Decimal],
    period: usize,
    std_dev_multiplier: Decimal,
) -> IndicatorResult<Vec<BollingerBand>> {
    if std_dev_multiplier.is_sign_negative() {
        return Err(IndicatorError::InvalidParameter(format!(
            "표준편차 배수는 음수일 수 없습니다: {}",
            std_dev_multiplier
        )));
    }

    if period == 0 || data.len() < period {
        return Ok(Vec::new());
    }

    let n = Decimal::from(period);

    let bands = data
        .windows(period)
        .map(|window| {
            let mean = window.iter().sum::<Decimal>() / n;
            let variance = window
                .iter()
                .map(|p| {
                    let diff = *p - mean;
                    diff * diff
                })
                .sum::<Decimal>()
                / n;

            let deviation = std_dev_multiplier * sqrt_decimal(variance);
            BollingerBand {
                upper: mean + deviation,
                middle: mean,
                lower: mean - deviation,
            }
        })
        .collect();

    Ok(bands)
}

/// Newton-Raphson 제곱근. 0 이하는 0.
pub(crate) fn sqrt_decimal(value: Decimal) -> Decimal {
    if value <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    // 1 근처에서 시작해야 큰 값에서도 빨리 수렴
    let mut x = if value > Decimal::ONE {
        value / Decimal::TWO
    } else {
        Decimal::ONE
    };

    for _ in 0..32 {
        let next = (x + value / x) / Decimal::TWO;
        if next == x {
            break;
        }
        x = next;
    }

    x
}
