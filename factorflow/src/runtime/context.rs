use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dag::{TaskId, TaskNode};

/// What an update operation knows about the task it runs for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaskContext {
    task: TaskId,
    iteration: usize,
    position: usize,
    seed: u64,
}

impl TaskContext {
    pub fn new(task: TaskId, iteration: usize, position: usize, seed: u64) -> Self {
        TaskContext {
            task,
            iteration,
            position,
            seed,
        }
    }

    pub(crate) fn of(task: &TaskNode, seed: u64) -> Self {
        TaskContext::new(task.task_id(), task.iteration(), task.position(), seed)
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Random source owned by this task. Depends only on the session seed and
    /// the task's place in the unrolled schedule, never on the worker.
    pub fn rng(&self) -> StdRng {
        let mut x = mix(self.seed ^ mix(self.iteration as u64));
        x = mix(x ^ (self.position as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        StdRng::seed_from_u64(x)
    }
}

// splitmix64 finaliser
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use crate::dag::TaskId;
    use crate::runtime::TaskContext;

    #[test]
    pub fn task_rng_test() {
        let c1 = TaskContext::new(TaskId(5), 1, 2, 42);
        let c2 = TaskContext::new(TaskId(5), 1, 2, 42);
        let a: u64 = c1.rng().gen();
        let b: u64 = c2.rng().gen();
        assert_eq!(a, b);

        let other: u64 = TaskContext::new(TaskId(6), 1, 3, 42).rng().gen();
        assert_ne!(a, other);
        let reseeded: u64 = TaskContext::new(TaskId(5), 1, 2, 43).rng().gen();
        assert_ne!(a, reseeded);
    }
}
