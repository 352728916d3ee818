use crate::error::{Error, Result};

/// Pass/fail criteria for one metric (optionally narrowed by a tag selector).
///
/// `metric` uses the k6 form `name` or `name{key:value,...}`; every expression must hold for the
/// set to pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
    /// Stop the run as soon as a live check sees this set fail.
    pub abort_on_fail: bool,
    /// Treat a metric with zero samples as passing.
    pub allow_empty: bool,
}

impl ThresholdSet {
    pub fn new<S: Into<String>>(
        metric: impl Into<String>,
        expressions: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            metric: metric.into(),
            expressions: expressions.into_iter().map(Into::into).collect(),
            abort_on_fail: false,
            allow_empty: false,
        }
    }

    #[must_use]
    pub fn with_abort_on_fail(mut self, abort: bool) -> Self {
        self.abort_on_fail = abort;
        self
    }

    #[must_use]
    pub fn with_allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    /// Parses the selector and every expression.
    pub fn parse(&self) -> Result<ParsedThreshold> {
        let invalid = |error: String| Error::InvalidThreshold {
            metric: self.metric.clone(),
            error,
        };

        let (name, selector) = parse_metric_selector(&self.metric).map_err(invalid)?;
        if self.expressions.is_empty() {
            return Err(invalid("no expressions".to_string()));
        }

        let exprs = self
            .expressions
            .iter()
            .map(|raw| parse_threshold_expr(raw).map(|e| (raw.clone(), e)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(invalid)?;

        Ok(ParsedThreshold {
            name,
            selector,
            exprs,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedThreshold {
    pub name: String,
    pub selector: Vec<(String, String)>,
    /// `(source text, parsed)` pairs, in declaration order.
    pub exprs: Vec<(String, ThresholdExpr)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ThresholdOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

impl ThresholdOp {
    pub fn compare(self, observed: f64, expected: f64) -> bool {
        match self {
            ThresholdOp::Lt => observed < expected,
            ThresholdOp::Lte => observed <= expected,
            ThresholdOp::Gt => observed > expected,
            ThresholdOp::Gte => observed >= expected,
            ThresholdOp::Eq => observed == expected,
            ThresholdOp::Ne => observed != expected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    /// Percentile in `(0, 100]`.
    P(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// Splits `name{k:v,...}` into the metric name and its selector pairs.
pub fn parse_metric_selector(
    raw: &str,
) -> std::result::Result<(String, Vec<(String, String)>), String> {
    let raw = raw.trim();
    let Some((name, rest)) = raw.split_once('{') else {
        if raw.is_empty() {
            return Err("empty metric name".to_string());
        }
        return Ok((raw.to_string(), Vec::new()));
    };

    let name = name.trim();
    if name.is_empty() {
        return Err("empty metric name".to_string());
    }
    let inner = rest
        .strip_suffix('}')
        .ok_or_else(|| format!("unterminated tag selector in `{raw}`"))?;

    let mut selector = Vec::new();
    for pair in inner.split(',').filter(|p| !p.trim().is_empty()) {
        let (k, v) = pair
            .split_once(':')
            .ok_or_else(|| format!("tag selector entry `{pair}` must be `key:value`"))?;
        let (k, v) = (k.trim(), v.trim());
        if k.is_empty() {
            return Err(format!("empty tag key in `{raw}`"));
        }
        selector.push((k.to_string(), v.to_string()));
    }

    Ok((name.to_string(), selector))
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        other => {
            let Some(inner) = other.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) else {
                return Err(format!("unknown aggregation `{left}` in threshold: {raw}"));
            };
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
            if !(p > 0.0 && p <= 100.0) {
                return Err(format!("percentile out of range in threshold: {raw}"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;
    if !value.is_finite() {
        return Err(format!("invalid numeric value in threshold: {raw}"));
    }

    Ok(ThresholdExpr { agg, op, value })
}
