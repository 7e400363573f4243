/*!
# Saving chains to CSV

Writes sampled chains as flat rows. Enable via the `csv` feature.
*/

use std::fmt::Display;
use std::fs::File;
use std::path::Path;

use csv::Writer;
use tracing::debug;

use crate::error::{Error, Result};
use crate::hypothesis::Scored;

/**
Saves per-chain samples as a CSV file.

The data is laid out as **chain × sample**. The file has the header
`chain,sample,hypothesis,prior,likelihood,posterior`, and one row per sample.
Hypotheses are written with their [`Display`] form; `-inf` scores are written
as `-inf`.

# Examples

```rust
use lot_mcmc::hypothesis::{Score, Scored};
use lot_mcmc::io::csv::save_csv;

let dir = tempfile::tempdir()?;
let chains = vec![vec![Scored::new("ab", Score::new(-1.0, -2.0, 1.0))]];
save_csv(&chains, dir.path().join("samples.csv"))?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_csv<H: Display>(chains: &[Vec<Scored<H>>], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|err| Error::io(format!("create {}", path.display()), err))?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(["chain", "sample", "hypothesis", "prior", "likelihood", "posterior"])?;
    for (chain_idx, chain) in chains.iter().enumerate() {
        for (sample_idx, sample) in chain.iter().enumerate() {
            wtr.write_record(&[
                chain_idx.to_string(),
                sample_idx.to_string(),
                sample.hypothesis.to_string(),
                sample.score.prior.to_string(),
                sample.score.likelihood.to_string(),
                sample.score.posterior.to_string(),
            ])?;
        }
    }

    wtr.flush()
        .map_err(|err| Error::io(format!("write {}", path.display()), err))?;
    debug!(n_chains = chains.len(), path = %path.display(), "saved csv");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::Score;
    use std::fs;

    #[test]
    fn rows_follow_chain_then_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let chains = vec![
            vec![
                Scored::new("a", Score::new(-1.0, -2.0, 1.0)),
                Scored::new("b, c", Score::new(-1.0, -1.0, 1.0)),
            ],
            vec![Scored::new("d", Score::impossible())],
        ];
        save_csv(&chains, &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "chain,sample,hypothesis,prior,likelihood,posterior");
        assert_eq!(lines[1], "0,0,a,-1,-2,-3");
        assert_eq!(lines[2], "0,1,\"b, c\",-1,-1,-2");
        assert_eq!(lines[3], "1,0,d,-inf,-inf,-inf");
        assert_eq!(lines.len(), 4);
    }
}
