//! Cross-checks between the sequential and the lane-parallel engine on
//! generated road networks.

use isochron::graph::{EdgeRecord, NodeRecord};
use isochron::relax::{CpuRelaxation, Relaxation, relax_to_convergence};
use isochron::{DisplayMode, EngineConfig, Graph, Hour, Session, sssp};

struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

/// A jittered grid with two-way streets and a few one-way shortcuts, each
/// segment closed during some hours
fn city(side: usize, seed: u64) -> Graph {
    let mut rng = XorShift(seed);
    let id = |row: usize, col: usize| format!("{row}-{col}");

    let mut nodes = Vec::new();
    for row in 0..side {
        for col in 0..side {
            let lat = 40.0 + row as f64 * 0.002 + rng.below(100) as f64 * 1e-6;
            let lon = -74.0 + col as f64 * 0.002 + rng.below(100) as f64 * 1e-6;
            nodes.push(NodeRecord::new(id(row, col), lat, lon));
        }
    }

    let mut edges = Vec::new();
    let mut street = |rng: &mut XorShift, from: String, to: String| {
        let distance = 150.0 + rng.below(100) as f64;
        let mut edge = EdgeRecord::new(from, to);
        for hour in 0..24u8 {
            if rng.below(10) != 0 {
                let congestion = 1.0 + rng.below(300) as f64 / 100.0;
                edge = edge.with_hour(hour, distance / 13.4112 * congestion, distance);
            }
        }
        edges.push(edge);
    };
    for row in 0..side {
        for col in 0..side {
            if col + 1 < side {
                street(&mut rng, id(row, col), id(row, col + 1));
                street(&mut rng, id(row, col + 1), id(row, col));
            }
            if row + 1 < side {
                street(&mut rng, id(row, col), id(row + 1, col));
                street(&mut rng, id(row + 1, col), id(row, col));
            }
        }
    }
    for _ in 0..side {
        let (a, b) = (rng.below(side as u64) as usize, rng.below(side as u64) as usize);
        let (c, d) = (rng.below(side as u64) as usize, rng.below(side as u64) as usize);
        street(&mut rng, id(a, b), id(c, d));
    }

    Graph::from_records(&nodes, &edges).unwrap()
}

#[test]
fn engines_agree_on_generated_cities() {
    let config = EngineConfig::default();
    for seed in [3u64, 17, 2024] {
        let graph = city(12, seed);
        for hour in [0u8, 8, 17, 23] {
            let hour = Hour::new(hour).unwrap();
            for source in [0, graph.node_count() / 2, graph.node_count() - 1] {
                let exact = sssp::shortest_paths(&graph, source, hour, &config)
                    .unwrap()
                    .to_field();
                let relaxed =
                    relax_to_convergence(&graph, source, hour, graph.hop_diameter_bound()).unwrap();
                let difference = exact.max_relative_difference(&relaxed);
                assert!(
                    difference.is_some_and(|d| d <= 1e-6),
                    "seed {seed} hour {hour} source {source}: {difference:?}"
                );
            }
        }
    }
}

#[test]
fn relaxation_is_monotone_and_idempotent() {
    let graph = city(10, 5);
    let hour = Hour::new(12).unwrap();
    let mut engine = CpuRelaxation::from_graph(&graph, hour, 1000).unwrap();
    engine.reset(7).unwrap();

    let mut previous = engine.field().unwrap();
    while engine.run_pass().unwrap() {
        let field = engine.field().unwrap();
        for (before, after) in previous.iter().zip(field.iter()) {
            assert!(after.time <= before.time);
            assert!(after.valid || !before.valid);
        }
        previous = field;
    }

    let converged = engine.field().unwrap();
    for _ in 0..3 {
        assert!(!engine.run_pass().unwrap());
    }
    assert_eq!(engine.field().unwrap(), converged);
}

#[test]
fn session_reveal_matches_instant_result() {
    let graph = city(8, 11);
    let hour = Hour::new(9).unwrap();

    let mut instant = Session::new(graph.clone(), EngineConfig::default()).unwrap();
    instant.set_hour(hour).unwrap();
    instant.set_source(20).unwrap();
    instant.set_mode(DisplayMode::Isochronic);
    instant.tick().unwrap();

    let mut animated = Session::new(graph, EngineConfig::default()).unwrap();
    animated.set_hour(hour).unwrap();
    animated.set_source(20).unwrap();
    animated.set_mode(DisplayMode::Isochronic);
    animated.set_transition(true);
    let mut reached = 0;
    while animated.is_animating() {
        animated.tick().unwrap();
        let now = animated.field().unwrap().reached_count();
        assert!(now >= reached);
        reached = now;
    }

    assert_eq!(animated.field().unwrap(), instant.field().unwrap());
    assert_eq!(animated.frame().unwrap().nodes, instant.frame().unwrap().nodes);
}
