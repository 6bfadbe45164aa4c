use std::path::PathBuf;

use crate::domain::Cost;
use crate::error::{Error, Result};

/// All tunable parameters of the solver, with the defaults used when a flag
/// is not given on the command line.
#[derive(Debug, Clone)]
pub struct Config {
    /// PRNG seed.
    pub seed: u32,
    /// Wall-clock stopping bound, in seconds.
    pub time_limit: u64,
    /// Record incumbent statistics during the run?
    pub collect_statistics: bool,
    /// Where to write the statistics CSV (only with `collect_statistics`).
    pub stats_path: Option<PathBuf>,

    pub init_capacity_penalty: Cost,
    pub init_time_warp_penalty: Cost,

    /// Manage penalties every this many iterations.
    pub nb_penalty_management: usize,
    pub penalty_increase: f64,
    pub penalty_decrease: f64,
    pub target_feasible: f64,

    pub min_pop_size: usize,
    pub generation_size: usize,
    pub nb_elite: usize,
    pub nb_close: usize,
    pub lb_diversity: f64,
    pub ub_diversity: f64,

    /// Percent chance to re-educate an infeasible offspring under boosted
    /// penalties.
    pub repair_probability: usize,
    pub repair_booster: Cost,

    /// Granular neighbourhood size.
    pub nb_granular: usize,
    pub weight_wait_time: Cost,
    pub weight_time_warp: Cost,

    /// Re-educate new best solutions with post-processing?
    pub should_intensify: bool,
    /// Window length for the enumerative subpath polish.
    pub post_process_path_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 0,
            time_limit: i32::MAX as u64,
            collect_statistics: false,
            stats_path: None,
            init_capacity_penalty: 20,
            init_time_warp_penalty: 6,
            nb_penalty_management: 47,
            penalty_increase: 1.34,
            penalty_decrease: 0.32,
            target_feasible: 0.43,
            min_pop_size: 25,
            generation_size: 40,
            nb_elite: 4,
            nb_close: 5,
            lb_diversity: 0.1,
            ub_diversity: 0.5,
            repair_probability: 79,
            repair_booster: 12,
            nb_granular: 34,
            weight_wait_time: 18,
            weight_time_warp: 20,
            should_intensify: true,
            post_process_path_length: 7,
        }
    }
}

impl Config {
    /// Eager domain validation; every violation is fatal.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfiguration(msg.into()));

        if self.penalty_increase < 1.0 {
            return invalid("penaltyIncrease must be >= 1");
        }

        if !(0.0..=1.0).contains(&self.penalty_decrease) {
            return invalid("penaltyDecrease must be in [0, 1]");
        }

        if !(0.0..=1.0).contains(&self.target_feasible) {
            return invalid("targetFeasible must be in [0, 1]");
        }

        if self.repair_booster < 1 {
            return invalid("repairBooster must be >= 1");
        }

        if self.repair_probability > 100 {
            return invalid("repairProbability must be in [0, 100]");
        }

        if !(0.0..=1.0).contains(&self.lb_diversity) || !(0.0..=1.0).contains(&self.ub_diversity) {
            return invalid("diversity bounds must be in [0, 1]");
        }

        if self.lb_diversity >= self.ub_diversity {
            return invalid("lbDiversity must be below ubDiversity");
        }

        if self.nb_penalty_management == 0 {
            return invalid("nbPenaltyManagement must be positive");
        }

        if self.min_pop_size == 0 {
            return invalid("minPopSize must be positive");
        }

        if self.nb_granular == 0 {
            return invalid("nbGranular must be positive");
        }

        Ok(())
    }
}

/// Parsed command line: the two positional paths plus the flag overrides.
#[derive(Debug, Clone)]
pub struct CommandLine {
    pub instance_path: PathBuf,
    pub solution_path: PathBuf,
    pub config: Config,
}

impl CommandLine {
    /// Parses `program INSTANCE SOLUTION [--flag value]*`. The argument
    /// count must be odd (flags come in pairs) and at least three.
    pub fn parse(args: &[String]) -> Result<Self> {
        if args.len() % 2 != 1 || args.len() < 3 {
            return Err(Error::InvalidArgument(
                "incorrect number of arguments".into(),
            ));
        }

        fn parse<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
            value
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("'{flag}' cannot be '{value}'")))
        }

        let mut config = Config::default();

        for pair in args[3..].chunks(2) {
            let (flag, value) = (pair[0].as_str(), pair[1].as_str());

            match flag {
                "--seed" => config.seed = parse(flag, value)?,
                "--timeLimit" => config.time_limit = parse(flag, value)?,
                "--collectStatistics" => config.collect_statistics = parse(flag, value)?,
                "--statsPath" => config.stats_path = Some(PathBuf::from(value)),
                "--initialCapacityPenalty" => {
                    config.init_capacity_penalty = parse(flag, value)?
                }
                "--initialTimeWarpPenalty" => {
                    config.init_time_warp_penalty = parse(flag, value)?
                }
                "--nbPenaltyManagement" => config.nb_penalty_management = parse(flag, value)?,
                "--penaltyIncrease" => config.penalty_increase = parse(flag, value)?,
                "--penaltyDecrease" => config.penalty_decrease = parse(flag, value)?,
                "--targetFeasible" => config.target_feasible = parse(flag, value)?,
                "--minPopSize" => config.min_pop_size = parse(flag, value)?,
                "--generationSize" => config.generation_size = parse(flag, value)?,
                "--nbElite" => config.nb_elite = parse(flag, value)?,
                "--nbClose" => config.nb_close = parse(flag, value)?,
                "--lbDiversity" => config.lb_diversity = parse(flag, value)?,
                "--ubDiversity" => config.ub_diversity = parse(flag, value)?,
                "--repairProbability" => config.repair_probability = parse(flag, value)?,
                "--repairBooster" => config.repair_booster = parse(flag, value)?,
                "--nbGranular" => config.nb_granular = parse(flag, value)?,
                "--weightWaitTime" => config.weight_wait_time = parse(flag, value)?,
                "--weightTimeWarp" => config.weight_time_warp = parse(flag, value)?,
                "--shouldIntensify" => config.should_intensify = parse(flag, value)?,
                "--postProcessPathLength" => {
                    config.post_process_path_length = parse(flag, value)?
                }
                other => {
                    return Err(Error::InvalidArgument(format!("unknown flag '{other}'")))
                }
            }
        }

        config.validate()?;

        Ok(Self {
            instance_path: PathBuf::from(&args[1]),
            solution_path: PathBuf::from(&args[2]),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Vec<String> {
        let mut out = vec!["solver".to_owned(), "in.txt".to_owned(), "out.txt".to_owned()];
        out.extend(extra.iter().map(|s| (*s).to_owned()));
        out
    }

    #[test]
    fn defaults_without_flags() {
        let cli = CommandLine::parse(&args(&[])).unwrap();

        assert_eq!(cli.instance_path, PathBuf::from("in.txt"));
        assert_eq!(cli.solution_path, PathBuf::from("out.txt"));
        assert_eq!(cli.config.seed, 0);
        assert_eq!(cli.config.nb_granular, 34);
        assert_eq!(cli.config.min_pop_size, 25);
        assert!(cli.config.should_intensify);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = CommandLine::parse(&args(&[
            "--seed",
            "99",
            "--nbGranular",
            "20",
            "--shouldIntensify",
            "false",
            "--targetFeasible",
            "0.5",
        ]))
        .unwrap();

        assert_eq!(cli.config.seed, 99);
        assert_eq!(cli.config.nb_granular, 20);
        assert!(!cli.config.should_intensify);
        assert!((cli.config.target_feasible - 0.5).abs() < 1e-9);
    }

    #[test]
    fn even_argument_count_is_rejected() {
        let mut bad = args(&[]);
        bad.push("--seed".to_owned()); // value missing

        assert!(matches!(
            CommandLine::parse(&bad),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn too_few_arguments_are_rejected() {
        let bad = vec!["solver".to_owned(), "in.txt".to_owned()];
        assert!(matches!(
            CommandLine::parse(&bad),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn bad_values_and_unknown_flags_are_rejected() {
        assert!(matches!(
            CommandLine::parse(&args(&["--seed", "banana"])),
            Err(Error::InvalidArgument(_))
        ));

        assert!(matches!(
            CommandLine::parse(&args(&["--warpSpeed", "9"])),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn out_of_domain_configuration_is_rejected() {
        assert!(matches!(
            CommandLine::parse(&args(&["--penaltyIncrease", "0.5"])),
            Err(Error::InvalidConfiguration(_))
        ));

        assert!(matches!(
            CommandLine::parse(&args(&["--lbDiversity", "0.9"])),
            Err(Error::InvalidConfiguration(_))
        ));

        assert!(matches!(
            CommandLine::parse(&args(&["--repairBooster", "0"])),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }
}
