/*!
# Text stream format for a single distribution

```text
distVersion=0.1
type=gamma
numParams=2
1.5 0.25
```

The first two lines are `key=value` pairs. The parameter block (the last two lines) is
written and parsed by the distribution itself, through
[`Distribution::write_params_to_stream`] and [`Distribution::read_params_from_stream`].

# Examples

```rust
use std::io::Cursor;
use mini_priors::distributions::{Distribution, Gamma};
use mini_priors::io::{read_dist_from_stream, write_dist_to_stream};

let gamma = Gamma::with_params(1.5, 0.25);
let mut buf = Vec::new();
write_dist_to_stream(&gamma, &mut buf)?;

let back = read_dist_from_stream(&mut Cursor::new(buf))?;
assert!(back.equals(&gamma, 0.0));
# Ok::<(), mini_priors::DistError>(())
```
*/

use std::io::{BufRead, Write};

use log::debug;
use ndarray::Array1;

use crate::distributions::{Distribution, ParamSet};
use crate::error::{DistError, Result};
use crate::registry::DistRegistry;

/// The only format version this crate reads and writes.
pub const DIST_VERSION: &str = "0.1";

const VERSION_KEY: &str = "distVersion";
const TYPE_KEY: &str = "type";
const NUM_PARAMS_KEY: &str = "numParams";

/// Writes the version line, the type line and the distribution's parameter block.
pub fn write_dist_to_stream<W: Write>(dist: &dyn Distribution, out: &mut W) -> Result<()> {
    writeln!(out, "{VERSION_KEY}={DIST_VERSION}")?;
    writeln!(out, "{TYPE_KEY}={}", dist.dist_type())?;
    dist.write_params_to_stream(out)
}

/// Reads one distribution, dispatching on its type tag through the global registry.
pub fn read_dist_from_stream<R: BufRead>(input: &mut R) -> Result<Box<dyn Distribution>> {
    read_dist_from_stream_with(input, DistRegistry::global())
}

/// Like [`read_dist_from_stream`], resolving the type tag in `registry`.
pub fn read_dist_from_stream_with<R: BufRead>(
    input: &mut R,
    registry: &DistRegistry,
) -> Result<Box<dyn Distribution>> {
    let line = next_line(input)?;
    let version = key_value(&line, VERSION_KEY)?;
    if version != DIST_VERSION {
        return Err(DistError::Version(version.to_string()));
    }

    let line = next_line(input)?;
    let dist_type = key_value(&line, TYPE_KEY)?;
    let mut dist = registry.create(dist_type)?;
    dist.read_params_from_stream(input)?;

    debug!("Read {} distribution with parameters {}", dist_type, dist.params());
    Ok(dist)
}

/// Writes `numParams=N` followed by the space-separated values.
pub fn write_param_block(params: &ParamSet, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "{NUM_PARAMS_KEY}={}", params.len())?;
    let values: Vec<String> = params.to_array().iter().map(|v| v.to_string()).collect();
    writeln!(out, "{}", values.join(" "))?;
    Ok(())
}

/// Parses a parameter block, which must declare exactly `expected` values.
pub fn read_param_block(input: &mut dyn BufRead, expected: usize) -> Result<Array1<f64>> {
    let line = next_line(input)?;
    let declared = key_value(&line, NUM_PARAMS_KEY)?;
    let declared: usize = declared
        .trim()
        .parse()
        .map_err(|_| DistError::format(format!("invalid parameter count `{declared}`")))?;
    if declared != expected {
        return Err(DistError::format(format!(
            "stream declares {declared} parameter(s), distribution has {expected}"
        )));
    }

    let line = next_line(input)?;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != declared {
        return Err(DistError::format(format!(
            "expected {declared} parameter value(s), found {}",
            tokens.len()
        )));
    }
    tokens
        .iter()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| DistError::format(format!("invalid parameter value `{tok}`")))
        })
        .collect()
}

/// Next line without its terminator. Running out of input is a format error.
fn next_line(input: &mut dyn BufRead) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(DistError::format("unexpected end of stream"));
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(line)
}

/// Splits `key=value`, requiring exactly one `=` and the given key.
fn key_value<'a>(line: &'a str, key: &str) -> Result<&'a str> {
    let tokens: Vec<&str> = line.split('=').collect();
    match tokens.as_slice() {
        [k, v] if *k == key => Ok(*v),
        _ => Err(DistError::format(format!("expected `{key}=<value>`, found `{line}`"))),
    }
}
