use lot_mcmc::core::ChainRunner;
use lot_mcmc::hypothesis::Posterior;
use lot_mcmc::metropolis_hastings::MetropolisHastings;
use lot_mcmc::number_game::{Concept, ConceptSpace, SizePrinciple};

fn main() -> lot_mcmc::Result<()> {
    let space = ConceptSpace::standard(100)?;
    let target = Posterior::new(space.clone(), SizePrinciple::new(0.9, 100), vec![16, 8, 2, 64]);

    // Create a MH sampler with 4 parallel chains
    let mut mh = MetropolisHastings::new(target, space, Concept::Even, 1.0, 4)?;

    // Run the sampler for 1,000 steps, discarding the first 100 as burn-in
    let samples = mh.run(1000, 100);

    // We should have 900 samples per chain
    assert_eq!(samples.len(), 4);
    assert_eq!(samples[0].len(), 900);
    Ok(())
}
