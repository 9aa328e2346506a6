//! Structured-record form of a single distribution.
//!
//! A record is a JSON object:
//!
//! ```json
//! { "type": "gamma", "transforms": [{ "index": 1, "type": "negLogLogit" }],
//!   "nParams": 2, "a": 1.5, "b": 0.25 }
//! ```
//!
//! Reading a record fills an already-constructed distribution, so the record's `type`
//! must match the instance; use [`crate::registry::DistRegistry`] to build the instance.

use log::debug;
use ndarray::Array1;
use serde_json::{Map, Value};

use crate::distributions::ParamSet;
use crate::error::{DistError, Result};
use crate::transform::TransformSet;

const TYPE_FIELD: &str = "type";
const TRANSFORMS_FIELD: &str = "transforms";
const NUM_PARAMS_FIELD: &str = "nParams";

pub(crate) fn dist_to_record(dist_type: &str, params: &ParamSet, transforms: &TransformSet) -> Value {
    let mut fields = Map::new();
    fields.insert(TYPE_FIELD.into(), Value::from(dist_type));
    fields.insert(TRANSFORMS_FIELD.into(), transforms.to_value());
    fields.insert(NUM_PARAMS_FIELD.into(), Value::from(params.len()));
    let values = params.to_array();
    for (name, &value) in params.names().zip(values.iter()) {
        fields.insert(name.to_string(), Value::from(value));
    }
    Value::Object(fields)
}

/// Validates `value` against the instance's type and parameter names, returning the
/// parameter values in index order together with the rebuilt transforms.
pub(crate) fn dist_from_record(
    value: &Value,
    dist_type: &str,
    params: &ParamSet,
) -> Result<(Array1<f64>, TransformSet)> {
    let fields = value
        .as_object()
        .ok_or_else(|| DistError::format("distribution record is not an object"))?;

    let found = string_field(fields, TYPE_FIELD)?;
    if found != dist_type {
        return Err(DistError::InterfaceMismatch {
            expected: dist_type.to_string(),
            found: found.to_string(),
        });
    }

    let transforms = fields
        .get(TRANSFORMS_FIELD)
        .ok_or_else(|| missing(TRANSFORMS_FIELD))?;
    let transforms = TransformSet::from_value(transforms, params.len())?;

    let num_params = fields
        .get(NUM_PARAMS_FIELD)
        .and_then(Value::as_u64)
        .ok_or_else(|| missing(NUM_PARAMS_FIELD))?;
    if num_params as usize != params.len() {
        return Err(DistError::format(format!(
            "record declares {num_params} parameter(s), `{dist_type}` has {}",
            params.len()
        )));
    }

    let values = params
        .names()
        .map(|name| {
            fields
                .get(name)
                .and_then(Value::as_f64)
                .ok_or_else(|| missing(name))
        })
        .collect::<Result<Array1<f64>>>()?;

    debug!("Read {} record with parameters {}", dist_type, values);
    Ok((values, transforms))
}

fn string_field<'a>(fields: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(name))
}

fn missing(name: &str) -> DistError {
    DistError::format(format!("missing or mistyped record field `{name}`"))
}
