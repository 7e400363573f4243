/*!
# JSON persistence

Scored samples round-trip through JSON with `-inf` scores written as `null`.
Data sets are JSON arrays of `{"input": ..., "output": ...}` objects, where
`output` is either a mapping from strings to counts or any other JSON value,
which is rejected as malformed when frequencies are required.
*/

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::hypothesis::Scored;
use crate::likelihood::{frequency_data, Datum, FrequencyDatum};

/**
Writes scored samples to `path` as pretty-printed JSON.

# Examples

```rust
use lot_mcmc::hypothesis::{Score, Scored};
use lot_mcmc::io::{load_json, save_json};

let dir = tempfile::tempdir()?;
let path = dir.path().join("samples.json");
let samples = vec![Scored::new("a".to_string(), Score::new(-1.0, -2.0, 1.0))];

save_json(&samples, &path)?;
let back: Vec<Scored<String>> = load_json(&path)?;
assert_eq!(back, samples);
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_json<H: Serialize>(samples: &[Scored<H>], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|err| Error::io(format!("create {}", path.display()), err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, samples)?;
    writer
        .flush()
        .map_err(|err| Error::io(format!("write {}", path.display()), err))?;
    debug!(n = samples.len(), path = %path.display(), "saved samples");
    Ok(())
}

pub fn load_json<H: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<Scored<H>>> {
    read(path.as_ref())
}

/// Reads a data set without checking the shape of each output.
pub fn load_data<I: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<Datum<I>>> {
    read(path.as_ref())
}

/// Reads a data set whose outputs must all be count mappings.
///
/// Fails with [`Error::MalformedDatum`] on the first datum that is not.
pub fn load_frequency_data<I: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<Vec<FrequencyDatum<I>>> {
    frequency_data(load_data(path)?)
}

fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file =
        File::open(path).map_err(|err| Error::io(format!("open {}", path.display()), err))?;
    let value = serde_json::from_reader(BufReader::new(file))?;
    debug!(path = %path.display(), "loaded json");
    Ok(value)
}
