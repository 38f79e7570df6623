use crate::DepthFirstSearch;
use crate::IterativeDeepeningSearch;
use crate::Mdp;
use crate::RandomSearch;
use crate::UctSearch;
use hzn_core::Reward;
use hzn_task::State;
use hzn_task::TaskError;
use rand::rngs::SmallRng;
use rand::Rng;

/// Which transition model an engine runs rollouts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    /// The probabilistic task: successors are sampled from CPF
    /// distributions.
    Probabilistic,
    /// The most-likely determinization.
    MostLikely,
}

/// How the anytime search decides it is done with a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    Time,
    Rollouts,
    TimeAndRollouts,
}

/// A search engine estimates Q-values for the legal actions of a state.
///
/// Engines are single-threaded and borrow the [`Mdp`] façade and the
/// process-wide random stream only for the duration of a call; they own
/// nothing but their own caches and parameters.
pub trait SearchEngine {
    fn name(&self) -> &'static str;

    /// One Q-value estimate per action. Entries of inapplicable (or, with
    /// `prune`, unreasonable) actions are negative infinity.
    fn estimate_q_values(
        &mut self,
        mdp: &mut Mdp,
        rng: &mut SmallRng,
        state: &State,
        prune: bool,
    ) -> Vec<Reward>;

    /// Calibrates engine parameters on the training set. Default: nothing
    /// to learn.
    fn learn(&mut self, _mdp: &mut Mdp, _rng: &mut SmallRng, _training: &[State]) {}

    fn set_caching_enabled(&mut self, enabled: bool);

    fn set_max_search_depth(&mut self, depth: usize);

    fn max_search_depth(&self) -> usize;

    /// The indices of the best actions: all applicable actions whose
    /// estimate ties with the maximum. Falls back to the applicable set
    /// when no action received a finite estimate (e.g. a zero-rollout
    /// budget).
    fn estimate_best_actions(
        &mut self,
        mdp: &mut Mdp,
        rng: &mut SmallRng,
        state: &State,
    ) -> Vec<usize> {
        let estimates = self.estimate_q_values(mdp, rng, state, true);
        let best = estimates
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let candidates: Vec<usize> = estimates
            .iter()
            .enumerate()
            .filter(|&(_, &q)| q.is_finite() && hzn_core::value_ge(q, best))
            .map(|(index, _)| index)
            .collect();
        if candidates.is_empty() {
            return mdp.applicable_action_indices(state, true);
        }
        candidates
    }
}

/// Picks uniformly among tied candidates.
pub(crate) fn choose_uniformly(rng: &mut SmallRng, candidates: &[usize]) -> usize {
    candidates[rng.random_range(0..candidates.len())]
}

/// Options every engine understands.
#[derive(Debug, Clone)]
pub struct CommonOptions {
    pub caching: bool,
    pub task_mode: Option<TaskMode>,
    pub max_search_depth: Option<usize>,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            caching: true,
            task_mode: None,
            max_search_depth: None,
        }
    }
}

/// A parsed `[ENGINE opt …]` search-engine specification.
#[derive(Debug, Clone)]
pub enum EngineSpec {
    Uct {
        common: CommonOptions,
        scale: f64,
        timeout_policy: TimeoutPolicy,
        timeout: f64,
        max_rollouts: usize,
        initial_visits: u32,
        initializer: Box<EngineSpec>,
    },
    Ids {
        common: CommonOptions,
        timeout: f64,
        strict_timeout: f64,
        terminate_with_reasonable_action: bool,
        min_search_depth: usize,
    },
    Dfs {
        common: CommonOptions,
    },
    Random {
        common: CommonOptions,
    },
}

impl EngineSpec {
    /// Parses a nested engine description such as
    /// `[UCT -t 1.0 -i [IDS -sd 10]]`.
    pub fn parse(description: &str) -> Result<EngineSpec, TaskError> {
        let inner = strip_brackets(description.trim())?;
        let (engine, rest) = inner
            .split_once(char::is_whitespace)
            .map(|(head, tail)| (head, tail.trim()))
            .unwrap_or((inner, ""));
        let mut options = parse_options(rest)?;

        let mut common = CommonOptions::default();
        options.retain(|(param, value)| match param.as_str() {
            "-uc" => {
                common.caching = value != "0";
                false
            }
            "-task" => {
                common.task_mode = match value.as_str() {
                    "PROB" => Some(TaskMode::Probabilistic),
                    "MLD" => Some(TaskMode::MostLikely),
                    _ => return true,
                };
                false
            }
            "-sd" => {
                common.max_search_depth = value.parse().ok();
                false
            }
            _ => true,
        });

        let spec = match engine {
            "UCT" => {
                let mut scale = 1.0;
                let mut timeout_policy = TimeoutPolicy::Time;
                let mut timeout = 2.0;
                let mut max_rollouts = 0;
                let mut initial_visits = hzn_core::INITIAL_VISITS;
                let mut initializer: Option<EngineSpec> = None;
                for (param, value) in &options {
                    match param.as_str() {
                        "-mcs" => scale = parse_number(param, value)?,
                        "-T" => {
                            timeout_policy = match value.as_str() {
                                "TIME" => TimeoutPolicy::Time,
                                "ROLLOUTS" => TimeoutPolicy::Rollouts,
                                "TIME_AND_ROLLOUTS" => TimeoutPolicy::TimeAndRollouts,
                                other => {
                                    return Err(TaskError::Parse(format!(
                                        "unknown timeout policy `{}`",
                                        other
                                    )))
                                }
                            }
                        }
                        "-t" => timeout = parse_number(param, value)?,
                        "-r" => max_rollouts = parse_number(param, value)? as usize,
                        "-iv" => initial_visits = parse_number(param, value)? as u32,
                        "-i" => initializer = Some(EngineSpec::parse(value)?),
                        other => return Err(unused_option(other, value)),
                    }
                }
                EngineSpec::Uct {
                    common,
                    scale,
                    timeout_policy,
                    timeout,
                    max_rollouts,
                    initial_visits,
                    initializer: Box::new(initializer.ok_or_else(|| {
                        TaskError::Parse("UCT requires an initializer (-i)".to_string())
                    })?),
                }
            }
            "IDS" => {
                let mut timeout = 0.005;
                let mut strict_timeout = 0.1;
                let mut terminate_with_reasonable_action = true;
                let mut min_search_depth = 1;
                for (param, value) in &options {
                    match param.as_str() {
                        "-t" => timeout = parse_number(param, value)?,
                        "-st" => strict_timeout = parse_number(param, value)?,
                        "-tra" => terminate_with_reasonable_action = value != "0",
                        "-minsd" => min_search_depth = parse_number(param, value)? as usize,
                        other => return Err(unused_option(other, value)),
                    }
                }
                EngineSpec::Ids {
                    common,
                    timeout,
                    strict_timeout,
                    terminate_with_reasonable_action,
                    min_search_depth,
                }
            }
            "DFS" => {
                if let Some((param, value)) = options.first() {
                    return Err(unused_option(param, value));
                }
                EngineSpec::Dfs { common }
            }
            "RAND" => {
                if let Some((param, value)) = options.first() {
                    return Err(unused_option(param, value));
                }
                EngineSpec::Random { common }
            }
            other => {
                return Err(TaskError::Parse(format!("unknown search engine `{}`", other)))
            }
        };
        Ok(spec)
    }

    /// Instantiates the engine tree against a compiled task.
    pub fn build(&self, mdp: &Mdp) -> Box<dyn SearchEngine> {
        match self {
            EngineSpec::Uct {
                common,
                scale,
                timeout_policy,
                timeout,
                max_rollouts,
                initial_visits,
                initializer,
            } => {
                let initializer_engine = initializer.build(mdp);
                // a random initializer injects no informed prior
                let initial_visits = if matches!(**initializer, EngineSpec::Random { .. }) {
                    0
                } else {
                    *initial_visits
                };
                Box::new(UctSearch::new(
                    mdp,
                    common.clone(),
                    *scale,
                    *timeout_policy,
                    *timeout,
                    *max_rollouts,
                    initial_visits,
                    initializer_engine,
                ))
            }
            EngineSpec::Ids {
                common,
                timeout,
                strict_timeout,
                terminate_with_reasonable_action,
                min_search_depth,
            } => Box::new(IterativeDeepeningSearch::new(
                mdp,
                common.clone(),
                *timeout,
                *strict_timeout,
                *terminate_with_reasonable_action,
                *min_search_depth,
            )),
            EngineSpec::Dfs { common } => Box::new(DepthFirstSearch::new(mdp, common.clone())),
            EngineSpec::Random { common } => Box::new(RandomSearch::new(mdp, common.clone())),
        }
    }
}

fn strip_brackets(description: &str) -> Result<&str, TaskError> {
    if description.starts_with('[') && description.ends_with(']') {
        Ok(description[1..description.len() - 1].trim())
    } else {
        Err(TaskError::Parse(format!(
            "engine specification `{}` is not bracketed",
            description
        )))
    }
}

/// Splits `-param value` pairs; a value may itself be a balanced
/// `[…]`-bracketed sub-specification.
fn parse_options(mut rest: &str) -> Result<Vec<(String, String)>, TaskError> {
    let mut options: Vec<(String, String)> = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(options);
        }
        let (param, after) = rest
            .split_once(char::is_whitespace)
            .ok_or_else(|| TaskError::Parse(format!("option `{}` lacks a value", rest)))?;
        let after = after.trim_start();
        let (value, remaining) = if after.starts_with('[') {
            split_balanced(after)?
        } else {
            after
                .split_once(char::is_whitespace)
                .map(|(value, tail)| (value, tail))
                .unwrap_or((after, ""))
        };
        options.push((param.to_string(), value.to_string()));
        rest = remaining;
    }
}

/// Splits off one balanced bracketed prefix.
fn split_balanced(text: &str) -> Result<(&str, &str), TaskError> {
    let mut depth = 0usize;
    for (position, byte) in text.bytes().enumerate() {
        match byte {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&text[..=position], &text[position + 1..]));
                }
            }
            _ => {}
        }
    }
    Err(TaskError::Parse(format!("unbalanced brackets in `{}`", text)))
}

fn parse_number(param: &str, value: &str) -> Result<f64, TaskError> {
    value
        .parse()
        .map_err(|_| TaskError::Parse(format!("option {} has non-numeric value `{}`", param, value)))
}

fn unused_option(param: &str, value: &str) -> TaskError {
    TaskError::Parse(format!("unused parameter value pair: {} / {}", param, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_specification() {
        let spec =
            EngineSpec::parse("[UCT -T ROLLOUTS -r 20000 -mcs 2.0 -i [IDS -sd 10 -t 0.01]]")
                .unwrap();
        match spec {
            EngineSpec::Uct {
                timeout_policy,
                max_rollouts,
                scale,
                initializer,
                ..
            } => {
                assert_eq!(timeout_policy, TimeoutPolicy::Rollouts);
                assert_eq!(max_rollouts, 20000);
                assert_eq!(scale, 2.0);
                match *initializer {
                    EngineSpec::Ids { common, timeout, .. } => {
                        assert_eq!(common.max_search_depth, Some(10));
                        assert_eq!(timeout, 0.01);
                    }
                    other => panic!("expected IDS initializer, got {:?}", other),
                }
            }
            other => panic!("expected UCT, got {:?}", other),
        }
    }

    #[test]
    fn common_options_are_shared() {
        let spec = EngineSpec::parse("[IDS -uc 0 -task MLD -minsd 2]").unwrap();
        match spec {
            EngineSpec::Ids {
                common,
                min_search_depth,
                ..
            } => {
                assert!(!common.caching);
                assert_eq!(common.task_mode, Some(TaskMode::MostLikely));
                assert_eq!(min_search_depth, 2);
            }
            other => panic!("expected IDS, got {:?}", other),
        }
    }

    #[test]
    fn uct_without_initializer_is_rejected() {
        assert!(EngineSpec::parse("[UCT -t 1.0]").is_err());
    }

    #[test]
    fn unknown_options_are_loud() {
        assert!(EngineSpec::parse("[RAND -zzz 1]").is_err());
        assert!(EngineSpec::parse("[XYZ]").is_err());
    }
}
