use hzn_task::GroundTask;
use hzn_task::TaskError;
use std::path::Path;
use std::path::PathBuf;

/// File name of the persisted preprocessed task inside the target
/// directory.
const PREPROCESSED_FILE: &str = "preprocessed.json";

fn preprocessed_path(directory: &Path) -> PathBuf {
    directory.join(PREPROCESSED_FILE)
}

/// Writes the compiled task into the target directory as a stable textual
/// serialization of ground CPFs, legal action states, domains, and hash
/// bases.
pub fn save_preprocessed(task: &GroundTask, directory: &Path) -> Result<(), TaskError> {
    std::fs::create_dir_all(directory)
        .map_err(|error| TaskError::Parse(format!("cannot create {:?}: {}", directory, error)))?;
    let path = preprocessed_path(directory);
    let payload = serde_json::to_string(task)
        .map_err(|error| TaskError::Parse(format!("cannot serialize task: {}", error)))?;
    std::fs::write(&path, payload)
        .map_err(|error| TaskError::Parse(format!("cannot write {:?}: {}", path, error)))?;
    log::info!("wrote preprocessed task to {:?}", path);
    Ok(())
}

/// Loads a previously persisted task in place of rerunning the grounder;
/// `None` when the directory holds none.
pub fn load_preprocessed(directory: &Path) -> Result<Option<GroundTask>, TaskError> {
    let path = preprocessed_path(directory);
    if !path.exists() {
        return Ok(None);
    }
    let payload = std::fs::read_to_string(&path)
        .map_err(|error| TaskError::Parse(format!("cannot read {:?}: {}", path, error)))?;
    let mut task: GroundTask = serde_json::from_str(&payload)
        .map_err(|error| TaskError::Parse(format!("malformed preprocessed task: {}", error)))?;
    // caches are not serialized; re-reserve the dense ones
    for cpf in &mut task.cpfs {
        cpf.eval.allocate_caches();
    }
    task.reward.eval.allocate_caches();
    for precondition in &mut task.preconditions {
        precondition.eval.allocate_caches();
    }
    log::info!("loaded preprocessed task from {:?}", path);
    Ok(Some(task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::compiled_counter_task;

    #[test]
    fn persisted_task_round_trips() {
        let directory = std::env::temp_dir().join(format!(
            "hzn-persist-{}",
            std::process::id()
        ));
        let task = compiled_counter_task(3);
        save_preprocessed(&task, &directory).unwrap();
        let loaded = load_preprocessed(&directory).unwrap().unwrap();
        std::fs::remove_dir_all(&directory).ok();

        assert_eq!(loaded.cpfs.len(), task.cpfs.len());
        assert_eq!(loaded.action_states, task.action_states);
        assert_eq!(loaded.initial_values, task.initial_values);
        assert_eq!(loaded.state_hashing_possible, task.state_hashing_possible);
        // the reloaded task evaluates like the original
        let state = loaded.initial_state();
        assert_eq!(state.hash_key, task.initial_state().hash_key);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let directory = std::env::temp_dir().join("hzn-persist-none");
        assert!(load_preprocessed(&directory).unwrap().is_none());
    }
}
