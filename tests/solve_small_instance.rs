use std::time::Duration;

use hgs_vrptw::stop::{MaxIterations, TimedNoImprovement};
use hgs_vrptw::{CommandLine, Config, GeneticSearch, Individual, ProblemData};

const INSTANCE: &str = "\
NAME : solomon-toy
TYPE : CVRPTW
DIMENSION : 7
EDGE_WEIGHT_TYPE : EUC_2D
CAPACITY : 30
VEHICLES : 3
NODE_COORD_SECTION
1 0 0
2 10 0
3 12 3
4 10 10
5 0 12
6 -5 6
7 -8 -2
DEMAND_SECTION
1 0
2 10
3 8
4 9
5 7
6 10
7 6
SERVICE_TIME_SECTION
1 0
2 10
3 10
4 10
5 10
6 10
7 10
TIME_WINDOW_SECTION
1 0 10000
2 0 2000
3 0 2000
4 100 2500
5 0 3000
6 0 3000
7 0 3000
RELEASE_TIME_SECTION
1 0
2 0
3 0
4 0
5 0
6 20
7 0
DEPOT_SECTION
1
-1
EOF
";

fn covers_each_client_once(data: &ProblemData, indiv: &Individual) -> bool {
    let mut seen = vec![0usize; data.num_clients() + 1];
    for route in indiv.routes() {
        for &client in route {
            seen[client] += 1;
        }
    }
    seen[1..].iter().all(|&count| count == 1)
}

#[test]
fn solves_instance_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let instance_path = dir.path().join("instance.txt");
    let solution_path = dir.path().join("solution.txt");
    std::fs::write(&instance_path, INSTANCE).unwrap();

    let data = ProblemData::from_file(&instance_path).unwrap();
    assert_eq!(data.num_clients(), 6);

    let config = Config {
        seed: 1,
        min_pop_size: 6,
        generation_size: 10,
        nb_penalty_management: 12,
        ..Config::default()
    };

    let mut search = GeneticSearch::new(&data, &config).unwrap();
    let mut stop = MaxIterations::new(60);
    let result = search.run(&mut stop);

    let best = result.best.expect("a solution is always produced");
    assert!(best.is_feasible());
    assert!(covers_each_client_once(&data, &best));

    // Write the solution file and reconstruct the individual from it; the
    // costs must agree.
    best.write_to(&solution_path, search.penalties(), 0.5).unwrap();
    let text = std::fs::read_to_string(&solution_path).unwrap();

    let mut routes: Vec<Vec<usize>> = text
        .lines()
        .filter(|line| line.starts_with("Route #"))
        .map(|line| {
            line.split(':')
                .nth(1)
                .unwrap()
                .split_whitespace()
                .map(|token| token.parse().unwrap())
                .collect()
        })
        .collect();
    routes.resize(data.num_vehicles(), Vec::new());

    let written_cost: i64 = text
        .lines()
        .find_map(|line| line.strip_prefix("Cost "))
        .unwrap()
        .parse()
        .unwrap();

    let rebuilt = Individual::new(&data, routes).unwrap();
    assert_eq!(rebuilt.cost(search.penalties()), written_cost);
}

#[test]
fn runs_are_reproducible_for_a_seed() {
    let data = ProblemData::parse(INSTANCE).unwrap();

    let run = |seed| {
        let config = Config {
            seed,
            min_pop_size: 5,
            generation_size: 8,
            ..Config::default()
        };

        let mut search = GeneticSearch::new(&data, &config).unwrap();
        let mut stop = MaxIterations::new(40);
        search
            .run(&mut stop)
            .best
            .map(|best| best.routes().to_vec())
    };

    assert_eq!(run(7), run(7));
    assert_eq!(run(8), run(8));
}

#[test]
fn stops_on_stagnation() {
    let data = ProblemData::parse(INSTANCE).unwrap();

    let config = Config {
        seed: 3,
        min_pop_size: 5,
        generation_size: 8,
        ..Config::default()
    };

    let mut search = GeneticSearch::new(&data, &config).unwrap();
    let mut stop = TimedNoImprovement::new(30, Duration::from_secs(3600)).unwrap();
    let result = search.run(&mut stop);

    // The toy instance converges long before an hour passes.
    assert!(result.best.is_some());
    assert!(result.elapsed < Duration::from_secs(3600));
}

#[test]
fn command_line_round_trip() {
    let args: Vec<String> = [
        "hgs-vrptw",
        "instance.txt",
        "solution.txt",
        "--seed",
        "5",
        "--timeLimit",
        "30",
        "--collectStatistics",
        "true",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect();

    let cli = CommandLine::parse(&args).unwrap();
    assert_eq!(cli.config.seed, 5);
    assert_eq!(cli.config.time_limit, 30);
    assert!(cli.config.collect_statistics);
}
