//! Parsing of `--arg` values and matching them against a function's parameters.

use {
    anyhow::{anyhow, bail, ensure, Context, Error},
    tracing::warn,
    wasm_machine::{Val, ValType},
};

fn is_separator(c: char) -> bool {
    c.is_ascii_whitespace() || c == ':'
}

/// Parses `T.const value` or a lane list `v(T.const a, T.const b, ...)`.
///
/// `i8` and `i16` constants produce `i32` values. A `v128` constant is a decimal or
/// `0x`-prefixed hexadecimal integer. A lane list shorter than 128 bits is padded by repeating
/// its last lane.
pub fn parse_value(input: &str) -> Result<Val, Error> {
    let input = input.trim();
    if let Some(lanes) = input.strip_prefix("v(") {
        let lanes = lanes
            .strip_suffix(')')
            .ok_or_else(|| anyhow!("expected ')' to close vector {:?}", input))?;
        return parse_lanes(input, lanes);
    }
    let (type_, text) = input
        .split_once(".const")
        .ok_or_else(|| anyhow!("invalid value {:?}, expected T.const value", input))?;
    let text = text.trim_start_matches(is_separator).trim_end();
    let val = match type_ {
        "i8" => Val::I32(text.parse::<i8>()?.into()),
        "i16" => Val::I32(text.parse::<i16>()?.into()),
        "i32" => Val::I32(text.parse()?),
        "i64" => Val::I64(text.parse()?),
        "f32" => Val::F32(text.parse()?),
        "f64" => Val::F64(text.parse()?),
        "v128" => Val::V128(parse_u128(text)?),
        _ => bail!("unknown value type {:?}", type_),
    };
    Ok(val)
}

fn parse_u128(text: &str) -> Result<u128, Error> {
    let val = match text.strip_prefix("0x") {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => text.parse(),
    };
    val.with_context(|| format!("invalid v128 value {:?}", text))
}

fn parse_lanes(input: &str, lanes: &str) -> Result<Val, Error> {
    let lanes = lanes
        .split(',')
        .map(str::trim)
        .filter(|lane| !lane.is_empty())
        .map(parse_value)
        .collect::<Result<Vec<_>, _>>()?;
    let Some(first) = lanes.first() else {
        bail!("empty vector {:?}", input);
    };
    let type_ = first.type_();
    let width = match type_ {
        ValType::I32 | ValType::F32 => 32,
        ValType::I64 | ValType::F64 => 64,
        _ => bail!("vector lanes must be scalars, got {}", type_),
    };
    ensure!(
        lanes.iter().all(|lane| lane.type_() == type_),
        "mixed types in vector {:?}",
        input
    );
    ensure!(lanes.len() * width <= 128, "vector {:?} is wider than 128 bits", input);

    let bits: Vec<u128> = lanes
        .iter()
        .map(|lane| match *lane {
            Val::I32(val) => u128::from(val as u32),
            Val::F32(val) => u128::from(val.to_bits()),
            Val::I64(val) => u128::from(val as u64),
            Val::F64(val) => u128::from(val.to_bits()),
            _ => 0,
        })
        .collect();
    if bits.len() * width < 128 {
        warn!(
            "vector {:?} is only {} bits wide, repeating last element",
            input,
            bits.len() * width
        );
    }
    let last = bits[bits.len() - 1];
    let val = (0..128 / width).fold(0u128, |acc, lane| {
        let lane_bits = bits.get(lane).copied().unwrap_or(last);
        acc | lane_bits << (lane * width)
    });
    Ok(Val::V128(val))
}

/// Matches `supplied` values against `params` in order. Missing trailing values default to the
/// zero value of their parameter type.
pub fn call_arguments(params: &[ValType], supplied: &[Val]) -> Result<Vec<Val>, Error> {
    ensure!(
        supplied.len() <= params.len(),
        "function takes {} arguments, got {}",
        params.len(),
        supplied.len()
    );
    params
        .iter()
        .enumerate()
        .map(|(idx, &param)| match supplied.get(idx) {
            Some(val) if val.type_() == param => Ok(*val),
            Some(val) => bail!(
                "Type mismatch in argument {}: expected {}, got {}",
                idx,
                param,
                val.type_()
            ),
            None => Ok(param.default_val()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_constants() {
        assert_eq!(parse_value("i32.const 42").unwrap(), Val::I32(42));
        assert_eq!(parse_value("i32.const:-7").unwrap(), Val::I32(-7));
        assert_eq!(parse_value("i8.const -1").unwrap(), Val::I32(-1));
        assert_eq!(parse_value("i64.const 9000000000").unwrap(), Val::I64(9_000_000_000));
        assert_eq!(parse_value("f64.const 1.5").unwrap(), Val::F64(1.5));
        assert_eq!(parse_value("f32.const inf").unwrap(), Val::F32(f32::INFINITY));
        assert!(matches!(parse_value("f32.const nan").unwrap(), Val::F32(val) if val.is_nan()));
    }

    #[test]
    fn rejects_malformed_constants() {
        assert!(parse_value("i8.const 300").is_err());
        assert!(parse_value("i32.const").is_err());
        assert!(parse_value("u32.const 1").is_err());
        assert!(parse_value("42").is_err());
    }

    #[test]
    fn parses_vectors() {
        assert_eq!(parse_value("v128.const 0x10").unwrap(), Val::V128(0x10));
        assert_eq!(parse_value("v128.const 16").unwrap(), Val::V128(16));
        assert_eq!(
            parse_value("v(i64.const 1, i64.const 2)").unwrap(),
            Val::V128(1 | 2u128 << 64)
        );
    }

    #[test]
    fn short_lane_lists_repeat_the_last_lane() {
        assert_eq!(
            parse_value("v(i32.const 1, i32.const 2)").unwrap(),
            Val::V128(1 | 2u128 << 32 | 2u128 << 64 | 2u128 << 96)
        );
    }

    #[test]
    fn rejects_bad_lane_lists() {
        assert!(parse_value("v(i32.const 1, i64.const 2)").is_err());
        assert!(parse_value("v()").is_err());
        assert!(parse_value("v(i32.const 1").is_err());
        assert!(parse_value("v(i64.const 1, i64.const 2, i64.const 3)").is_err());
    }

    #[test]
    fn missing_arguments_default_to_zero() {
        let params = [ValType::I32, ValType::F64];
        assert_eq!(
            call_arguments(&params, &[Val::I32(3)]).unwrap(),
            vec![Val::I32(3), Val::F64(0.0)]
        );
    }

    #[test]
    fn extra_or_mistyped_arguments_are_errors() {
        let params = [ValType::I32];
        assert!(call_arguments(&params, &[Val::I32(1), Val::I32(2)]).is_err());
        assert!(call_arguments(&params, &[Val::I64(1)]).is_err());
    }
}
