//! Range interpolation
//!
//! Builds the pure mapping used by interpolation nodes. A mapping splits the
//! input range into segments, normalises the input within its segment, eases
//! it, and projects it onto the matching output segment.
//!
//! String output ranges interpolate every number embedded in the strings
//! position by position, so `"0deg"..="360deg"` or colour strings animate
//! naturally. Hex colours are normalised to `rgba(r, g, b, a)` first.

use std::rc::Rc;

use drift_core::{format_number, AnimationError, Graph, Mapping, NodeId, NodeValue, Result};
use regex::Regex;

use crate::easing::Easing;

/// Matches every number embedded in an output string
const NUMBER_PATTERN: &str = r"[0-9.\-]+";

/// Behaviour outside the input range
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Extrapolate {
    /// Continue the nearest segment's slope
    #[default]
    Extend,
    /// Return the input unchanged
    Identity,
    /// Hold the nearest output end
    Clamp,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutputRange {
    Numbers(Vec<f64>),
    Strings(Vec<String>),
}

/// Configuration for an interpolation mapping
#[derive(Clone, Debug)]
pub struct InterpolationConfig {
    pub input_range: Vec<f64>,
    pub output_range: OutputRange,
    pub easing: Easing,
    pub extrapolate_left: Extrapolate,
    pub extrapolate_right: Extrapolate,
}

impl InterpolationConfig {
    /// Numeric output range
    pub fn new(input_range: Vec<f64>, output_range: Vec<f64>) -> Self {
        Self {
            input_range,
            output_range: OutputRange::Numbers(output_range),
            easing: Easing::Linear,
            extrapolate_left: Extrapolate::Extend,
            extrapolate_right: Extrapolate::Extend,
        }
    }

    /// String output range, e.g. colours or `"45deg"`
    pub fn strings<S: Into<String>>(input_range: Vec<f64>, output_range: Vec<S>) -> Self {
        Self {
            output_range: OutputRange::Strings(output_range.into_iter().map(Into::into).collect()),
            ..Self::new(input_range, Vec::new())
        }
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Set the extrapolation on both sides
    pub fn extrapolate(mut self, extrapolate: Extrapolate) -> Self {
        self.extrapolate_left = extrapolate;
        self.extrapolate_right = extrapolate;
        self
    }

    pub fn extrapolate_left(mut self, extrapolate: Extrapolate) -> Self {
        self.extrapolate_left = extrapolate;
        self
    }

    pub fn extrapolate_right(mut self, extrapolate: Extrapolate) -> Self {
        self.extrapolate_right = extrapolate;
        self
    }

    /// Validate the ranges and build the mapping
    pub fn build(&self) -> Result<Mapping> {
        match &self.output_range {
            OutputRange::Numbers(output) => {
                let curve = NumericCurve::new(self, output.clone())?;
                Ok(Rc::new(move |input| NodeValue::Number(curve.apply(input))))
            }
            OutputRange::Strings(output) => self.build_string_mapping(output),
        }
    }

    fn build_string_mapping(&self, output: &[String]) -> Result<Mapping> {
        if output.len() < 2 {
            return Err(AnimationError::InvalidInterpolation(
                "outputRange must have at least 2 elements".to_string(),
            ));
        }

        let pattern = Regex::new(NUMBER_PATTERN)
            .map_err(|err| AnimationError::InvalidInterpolation(err.to_string()))?;
        let output: Vec<String> = output.iter().map(|s| color_to_rgba(s)).collect();
        let template = output[0].clone();

        // Every string must share the template's shape once numbers are removed.
        let shape = pattern.replace_all(&template, "").into_owned();
        let count = pattern.find_iter(&template).count();
        for value in &output[1..] {
            if pattern.replace_all(value, "") != shape || pattern.find_iter(value).count() != count
            {
                return Err(AnimationError::InvalidInterpolation(format!(
                    "'{value}' does not have the same shape as '{template}'"
                )));
            }
        }

        let mut columns = vec![Vec::with_capacity(output.len()); count];
        for value in &output {
            for (column, found) in columns.iter_mut().zip(pattern.find_iter(value)) {
                let number = found.as_str().parse::<f64>().map_err(|_| {
                    AnimationError::InvalidInterpolation(format!(
                        "'{}' in '{value}' is not a number",
                        found.as_str()
                    ))
                })?;
                column.push(number);
            }
        }

        let curves = columns
            .into_iter()
            .map(|column| NumericCurve::new(self, column))
            .collect::<Result<Vec<_>>>()?;
        let round_channels = template.starts_with("rgb");

        Ok(Rc::new(move |input| {
            let mut index = 0;
            let rendered = pattern.replace_all(&template, |_: &regex::Captures| {
                let value = curves.get(index).map_or(0.0, |curve| curve.apply(input));
                index += 1;
                // The alpha channel keeps its fraction.
                if round_channels && index < 4 {
                    format_number(value.round())
                } else {
                    format_number(value)
                }
            });
            NodeValue::Text(rendered.into_owned())
        }))
    }
}

/// Build an interpolation node reading from `parent`
pub fn interpolate(graph: &Graph, parent: NodeId, config: &InterpolationConfig) -> Result<NodeId> {
    let mapping = config.build()?;
    graph.interpolation(parent, mapping)
}

/// Validated numeric segments
struct NumericCurve {
    input: Vec<f64>,
    output: Vec<f64>,
    easing: Easing,
    left: Extrapolate,
    right: Extrapolate,
}

impl NumericCurve {
    fn new(config: &InterpolationConfig, output: Vec<f64>) -> Result<Self> {
        check_infinite_range("inputRange", &config.input_range)?;
        check_infinite_range("outputRange", &output)?;
        if config.input_range.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(AnimationError::InvalidInterpolation(format!(
                "inputRange must be monotonically increasing {:?}",
                config.input_range
            )));
        }
        if config.input_range.len() != output.len() {
            return Err(AnimationError::InvalidInterpolation(format!(
                "inputRange ({}) and outputRange ({}) must have the same length",
                config.input_range.len(),
                output.len()
            )));
        }

        Ok(Self {
            input: config.input_range.clone(),
            output,
            easing: config.easing,
            left: config.extrapolate_left,
            right: config.extrapolate_right,
        })
    }

    fn apply(&self, input: f64) -> f64 {
        let range = find_range(input, &self.input);
        interpolate_segment(
            input,
            (self.input[range], self.input[range + 1]),
            (self.output[range], self.output[range + 1]),
            self.easing,
            self.left,
            self.right,
        )
    }
}

fn check_infinite_range(name: &str, range: &[f64]) -> Result<()> {
    if range.len() < 2 {
        return Err(AnimationError::InvalidInterpolation(format!(
            "{name} must have at least 2 elements"
        )));
    }
    if range.len() == 2 && range[0] == f64::NEG_INFINITY && range[1] == f64::INFINITY {
        return Err(AnimationError::InvalidInterpolation(format!(
            "{name} cannot be ]-infinity;+infinity[ {range:?}"
        )));
    }
    Ok(())
}

/// Index of the segment `input` falls in; ends extend the outer segments
fn find_range(input: f64, range: &[f64]) -> usize {
    let mut i = 1;
    while i < range.len() - 1 {
        if range[i] >= input {
            break;
        }
        i += 1;
    }
    i - 1
}

fn interpolate_segment(
    input: f64,
    (input_min, input_max): (f64, f64),
    (output_min, output_max): (f64, f64),
    easing: Easing,
    left: Extrapolate,
    right: Extrapolate,
) -> f64 {
    let mut result = input;

    if result < input_min {
        match left {
            Extrapolate::Identity => return result,
            Extrapolate::Clamp => result = input_min,
            Extrapolate::Extend => {}
        }
    }
    if result > input_max {
        match right {
            Extrapolate::Identity => return result,
            Extrapolate::Clamp => result = input_max,
            Extrapolate::Extend => {}
        }
    }

    if output_min == output_max {
        return output_min;
    }
    if input_min == input_max {
        return if input <= input_min {
            output_min
        } else {
            output_max
        };
    }

    if input_min == f64::NEG_INFINITY {
        result = -result;
    } else if input_max == f64::INFINITY {
        result -= input_min;
    } else {
        result = (result - input_min) / (input_max - input_min);
    }

    result = easing.apply(result);

    if output_min == f64::NEG_INFINITY {
        -result
    } else if output_max == f64::INFINITY {
        result + output_min
    } else {
        result * (output_max - output_min) + output_min
    }
}

/// Normalise `#rgb`, `#rgba`, `#rrggbb` and `#rrggbbaa` to `rgba(r, g, b, a)`.
/// Anything else is returned unchanged.
fn color_to_rgba(input: &str) -> String {
    let Some(hex) = input.trim().strip_prefix('#') else {
        return input.to_string();
    };
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return input.to_string();
    }

    let expanded: String = match hex.len() {
        3 | 4 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 | 8 => hex.to_string(),
        _ => return input.to_string(),
    };

    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).unwrap_or(0);
    let alpha = if expanded.len() == 8 {
        f64::from(channel(6)) / 255.0
    } else {
        1.0
    };

    format!(
        "rgba({}, {}, {}, {})",
        channel(0),
        channel(2),
        channel(4),
        format_number(alpha)
    )
}
