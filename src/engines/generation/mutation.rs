use crate::config::EvolutionConfig;
use crate::error::{IdSortError, Result};
use rand::Rng;

/// Adaptive mutation intensity.
///
/// The count is the sum of two terms:
/// - inverse-proportional hypermutation, `|(1 - e*/f) * c + c|`, which grows
///   as the fitness `f` moves away from the target `e*`;
/// - hypermacromutation, `|(a - b) * scale|` for two uniform draws in `[0, 1)`,
///   which keeps some exploration even at the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutationPolicy {
    pub c: f64,
    pub e_star: f64,
    pub scale: f64,
}

impl MutationPolicy {
    pub fn new(c: f64, e_star: f64, scale: f64) -> Self {
        Self { c, e_star, scale }
    }

    pub fn from_config(config: &EvolutionConfig) -> Self {
        Self::new(config.param_c, config.param_e_star, config.param_scale)
    }

    /// Fitness-driven term alone.
    pub fn inverse_proportional(&self, fitness: f64) -> Result<f64> {
        if fitness == 0.0 {
            return Err(IdSortError::Domain(
                "mutation count undefined for a fitness of exactly zero".to_string(),
            ));
        }
        if !fitness.is_finite() {
            return Err(IdSortError::Domain(format!(
                "mutation count undefined for fitness {}",
                fitness
            )));
        }
        Ok(((1.0 - self.e_star / fitness) * self.c + self.c).abs())
    }

    /// Number of mutations to apply to offspring of a genome with `fitness`.
    /// Always consumes two draws from `rng`.
    pub fn mutation_count<R: Rng + ?Sized>(&self, fitness: f64, rng: &mut R) -> Result<usize> {
        let inverse = self.inverse_proportional(fitness)?;

        let a: f64 = rng.gen();
        let b: f64 = rng.gen();
        let hyper_macro = ((a - b) * self.scale).abs();

        let total = inverse + hyper_macro;
        if !total.is_finite() {
            return Err(IdSortError::Domain(format!(
                "mutation count overflowed for fitness {}",
                fitness
            )));
        }
        Ok(total.floor() as usize)
    }
}

/// Free-standing form of [`MutationPolicy::mutation_count`].
pub fn mutation_count<R: Rng + ?Sized>(
    c: f64,
    e_star: f64,
    fitness: f64,
    scale: f64,
    rng: &mut R,
) -> Result<usize> {
    MutationPolicy::new(c, e_star, scale).mutation_count(fitness, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_scale_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        // |((1 - 0/5) * 10) + 10| = 20, no macro term
        assert_eq!(mutation_count(10.0, 0.0, 5.0, 0.0, &mut rng).unwrap(), 20);
        assert_eq!(mutation_count(10.0, 0.0, 5.0, 0.0, &mut rng).unwrap(), 20);
    }

    #[test]
    fn test_fitness_at_target_gives_c() {
        let policy = MutationPolicy::new(7.5, 3.0, 0.0);
        assert_eq!(policy.inverse_proportional(3.0).unwrap(), 7.5);

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.mutation_count(3.0, &mut rng).unwrap(), 7);
    }

    #[test]
    fn test_zero_fitness_is_domain_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = mutation_count(10.0, 0.0, 0.0, 10.0, &mut rng);
        assert!(matches!(result, Err(IdSortError::Domain(_))));
    }

    #[test]
    fn test_non_finite_fitness_is_domain_error() {
        let policy = MutationPolicy::new(10.0, 0.0, 10.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(policy.mutation_count(f64::NAN, &mut rng).is_err());
        assert!(policy.mutation_count(f64::INFINITY, &mut rng).is_err());
    }

    #[test]
    fn test_macro_term_is_bounded_by_scale() {
        let policy = MutationPolicy::new(10.0, 0.0, 4.0);
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..1000 {
            let count = policy.mutation_count(2.0, &mut rng).unwrap();
            // inverse term is exactly 20, macro term lies in [0, 4)
            assert!((20..24).contains(&count), "count {} out of range", count);
        }
    }

    #[test]
    fn test_count_is_never_negative_for_any_sign() {
        let mut rng = StdRng::seed_from_u64(3);
        let fitnesses = [-50.0, -1.0, -0.001, 0.001, 0.5, 1.0, 42.0, 1e9];
        let params = [(-10.0, -3.0, -2.0), (10.0, 100.0, 10.0), (0.0, 0.0, 0.0), (3.0, -8.0, 1.0)];

        for &fitness in &fitnesses {
            for &(c, e_star, scale) in &params {
                let policy = MutationPolicy::new(c, e_star, scale);
                let inverse = policy.inverse_proportional(fitness).unwrap();
                assert!(inverse >= 0.0);
                // usize cannot be negative; the floor must not fall below the inverse term
                let count = policy.mutation_count(fitness, &mut rng).unwrap();
                assert!(count as f64 >= inverse.floor());
            }
        }
    }

    #[test]
    fn test_from_config_reads_params() {
        let config = EvolutionConfig {
            param_c: 2.0,
            param_e_star: 1.0,
            param_scale: 0.5,
            ..EvolutionConfig::default()
        };
        assert_eq!(MutationPolicy::from_config(&config), MutationPolicy::new(2.0, 1.0, 0.5));
    }
}
