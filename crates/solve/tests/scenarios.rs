//! End-to-end scenarios on small hand-built domains: the deterministic
//! chain, the Bernoulli flip-flop, the reward-lock trap, the hash overflow
//! boundary, static mutex elimination, and depth calibration.

use hzn_compile::preprocess;
use hzn_compile::testing::bernoulli_flipflop_task;
use hzn_compile::testing::mutex_task;
use hzn_compile::testing::reward_lock_task;
use hzn_compile::testing::tiny_counter_task;
use hzn_compile::testing::wide_boolean_task;
use hzn_solve::EngineSpec;
use hzn_solve::Mdp;
use hzn_solve::Planner;
use hzn_solve::SearchEngine;
use hzn_solve::TrainingConfig;
use hzn_task::CachingType;
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn engine(mdp: &Mdp, spec: &str) -> Box<dyn SearchEngine> {
    EngineSpec::parse(spec).unwrap().build(mdp)
}

#[test]
fn deterministic_chain_prefers_any_single_increment() {
    let mut mdp = Mdp::new(preprocess(&tiny_counter_task(3)).unwrap());
    let mut rng = SmallRng::seed_from_u64(17);
    let state = mdp.initial_state();

    // the exact engine values all three increments identically
    let mut ids = engine(&mdp, "[IDS -t 1.0 -tra 0]");
    let exact = ids.estimate_q_values(&mut mdp, &mut rng, &state, true);
    for action in 1..=3 {
        assert!(exact[action].is_finite());
        assert!((exact[action] - exact[1]).abs() < 1e-6);
        assert!(exact[action] > exact[0]);
    }

    // the anytime engine agrees on the preference
    let mut uct = engine(&mdp, "[UCT -T ROLLOUTS -r 1000 -i [IDS]]");
    let estimates = uct.estimate_q_values(&mut mdp, &mut rng, &state, true);
    for action in 1..=3 {
        assert!(estimates[action].is_finite());
    }
    let best = uct.estimate_best_actions(&mut mdp, &mut rng, &state);
    assert!(best.iter().all(|&action| (1..=3).contains(&action)));
}

#[test]
fn bernoulli_flip_flop_determinizes_to_the_action() {
    let task = preprocess(&bernoulli_flipflop_task(false)).unwrap();
    // 0.7 clears the one-half threshold, 0.3 does not: the most likely
    // outcome equals the action bit
    let lit = &task.cpfs[task.first_probabilistic_index];
    let noop = &task.action_states[0];
    let flip = &task.action_states[1];
    let state = task.initial_state();
    assert_eq!(lit.eval.determinized.evaluate(&state, noop), 0.0);
    assert_eq!(lit.eval.determinized.evaluate(&state, flip), 1.0);

    // under pruning both actions stay: their successor distributions differ
    let mut mdp = Mdp::new(task);
    let state = mdp.initial_state();
    assert_eq!(mdp.applicable_actions(&state, true), vec![0, 1]);
}

#[test]
fn reward_lock_trap_is_detected_and_short_circuits() {
    let mut mdp = Mdp::new(preprocess(&reward_lock_task()).unwrap());
    let mut rng = SmallRng::seed_from_u64(3);
    let dead = mdp.task.state_from_values(vec![1.0, 0.0], 4);

    assert!(mdp.is_reward_lock(&dead));

    // every successor under every action stays locked
    for action in 0..mdp.num_actions() {
        let next = mdp.deterministic_successor(&dead, action);
        assert!(mdp.is_reward_lock(&next));
    }

    // the search returns the cheapest action without expanding the tree
    let mut uct = engine(&mdp, "[UCT -T ROLLOUTS -r 100 -i [IDS]]");
    let best = uct.estimate_best_actions(&mut mdp, &mut rng, &dead);
    assert_eq!(best, vec![0]);
}

#[test]
fn wide_formulas_overflow_to_uncached_evaluation() {
    let task = preprocess(&wide_boolean_task(65)).unwrap();
    // one formula over 65 booleans: every hash base overflows the word
    for cpf in &task.cpfs {
        assert_eq!(cpf.eval.caching, CachingType::None);
        assert_eq!(cpf.eval.kleene_caching, CachingType::None);
    }
    assert!(!task.state_hashing_possible);
    assert!(!task.kleene_hashing_possible);

    // evaluation still works uncached
    let mut mdp = Mdp::new(task);
    let state = mdp.initial_state();
    let (next, reward) = mdp.deterministic_transition(&state, 0);
    assert_eq!(reward, 65.0);
    assert!(next.values.iter().all(|&v| v == 1.0));
    assert_eq!(next.hash_key, None);
}

#[test]
fn mutex_preconditions_eliminate_exactly_the_conflicts() {
    let task = preprocess(&mutex_task()).unwrap();
    // subsets of six fluents up to size two: 1 + 6 + 15, minus the three
    // same-slot pairs
    assert_eq!(task.action_states.len(), 19);
    assert!(task.action_states[0].is_noop());

    // enumeration is stable across compilations
    let again = preprocess(&mutex_task()).unwrap();
    let names: Vec<Vec<String>> = task
        .action_states
        .iter()
        .map(|action| action.scheduled_names(&task.action_fluents))
        .collect();
    let names_again: Vec<Vec<String>> = again
        .action_states
        .iter()
        .map(|action| action.scheduled_names(&again.action_fluents))
        .collect();
    assert_eq!(names, names_again);
}

#[test]
fn depth_calibration_stays_within_bounds() {
    let mut mdp = Mdp::new(preprocess(&tiny_counter_task(4)).unwrap());
    let mut rng = SmallRng::seed_from_u64(23);
    let mut ids = engine(&mdp, "[IDS -t 0.1 -st 0.5]");
    let training: Vec<hzn_task::State> = (0..10).map(|_| mdp.initial_state()).collect();
    ids.learn(&mut mdp, &mut rng, &training);
    // the learned depth is the largest whose mean time fits the budget;
    // the toy task is cheap enough for the noop-aware minimum of two
    assert!(ids.max_search_depth() >= 2);
    assert!(ids.max_search_depth() <= mdp.horizon());
}

#[test]
fn planner_sessions_emit_only_legal_actions() {
    let spec = EngineSpec::parse("[UCT -T ROLLOUTS -r 64 -i [IDS]]").unwrap();
    let task = preprocess(&bernoulli_flipflop_task(true)).unwrap();
    let legal: Vec<Vec<String>> = task
        .action_states
        .iter()
        .map(|action| action.scheduled_names(&task.action_fluents))
        .collect();

    let mut planner = Planner::new(task, &spec, 99, hzn_core::RAM_LIMIT_KB)
        .with_training_config(TrainingConfig {
            target_size: 8,
            inclusion_probability: 1.0,
            timeout: 0.5,
        });
    planner.init();

    let mut rng = SmallRng::seed_from_u64(99);
    let mut values = planner.mdp.initial_state().values;
    for _ in 0..planner.mdp.horizon() {
        let remaining = planner.remaining_steps();
        let action_names = planner.plan(values.clone());
        assert!(legal.contains(&action_names));
        // drive the next state ourselves, standing in for the simulator
        let state = planner.mdp.task.state_from_values(values, remaining);
        let index = planner
            .mdp
            .task
            .action_states
            .iter()
            .position(|action| {
                action.scheduled_names(&planner.mdp.task.action_fluents) == action_names
            })
            .unwrap();
        values = planner.mdp.sample_successor(&mut rng, &state, index).values;
    }
    assert_eq!(planner.remaining_steps(), 0);
}
