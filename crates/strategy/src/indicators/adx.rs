/// ADX (Average Directional Index) with Wilder smoothing.
///
/// Needs at least `2 * period + 1` candles. Returns `None` when
/// `+DI + -DI` is zero at every bar (no directional movement at all) —
/// callers treat `None` as "not trending", keeping the divide-by-zero
/// out of downstream boolean filters.
pub fn adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let len = closes.len();
    if period == 0 || len < 2 * period + 1 || highs.len() != len || lows.len() != len {
        return None;
    }

    let mut trs = Vec::with_capacity(len - 1);
    let mut plus_dms = Vec::with_capacity(len - 1);
    let mut minus_dms = Vec::with_capacity(len - 1);

    for i in 1..len {
        let hl = highs[i] - lows[i];
        let hc = (highs[i] - closes[i - 1]).abs();
        let lc = (lows[i] - closes[i - 1]).abs();
        trs.push(hl.max(hc).max(lc));

        let up_move = highs[i] - highs[i - 1];
        let down_move = lows[i - 1] - lows[i];
        plus_dms.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dms.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
    }

    // Wilder smoothing of TR and the directional movements.
    let mut tr_s = trs[..period].iter().sum::<f64>();
    let mut plus_s = plus_dms[..period].iter().sum::<f64>();
    let mut minus_s = minus_dms[..period].iter().sum::<f64>();

    let mut dxs = Vec::new();
    for i in period..trs.len() {
        tr_s = tr_s - tr_s / period as f64 + trs[i];
        plus_s = plus_s - plus_s / period as f64 + plus_dms[i];
        minus_s = minus_s - minus_s / period as f64 + minus_dms[i];

        if tr_s == 0.0 {
            continue;
        }
        let plus_di = 100.0 * plus_s / tr_s;
        let minus_di = 100.0 * minus_s / tr_s;
        let di_sum = plus_di + minus_di;
        if di_sum == 0.0 {
            continue;
        }
        dxs.push(100.0 * (plus_di - minus_di).abs() / di_sum);
    }

    if dxs.len() < period {
        return None;
    }

    let mut value = dxs[..period].iter().sum::<f64>() / period as f64;
    for &dx in &dxs[period..] {
        value = (value * (period - 1) as f64 + dx) / period as f64;
    }
    Some(value)
}
