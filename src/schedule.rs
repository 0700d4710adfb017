use core::fmt::Debug;
use core::hash::Hash;
use std::collections::{HashMap, VecDeque};

use crossbeam_channel::Receiver;
use log::debug;

/// Returned by the dependency bookkeeping to indicate whether a task has
/// seen all of its upstream completions and may be issued.
pub enum Status {
    Eligible,
    Ineligible,
}

impl Status {
    pub fn eligible_if(condition: bool) -> Self {
        if condition {
            Self::Eligible
        } else {
            Self::Ineligible
        }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// A unit of work in a dependency DAG. Each task names the tasks that may
/// only start after it completes; the executors derive the incoming-edge
/// counts from those lists, issue the zero-count tasks, and release
/// downstream tasks as completions arrive. Tasks own no shared mutable
/// state: whatever they publish for their successors must be written before
/// `run` returns, and the executor's completion signalling orders those
/// writes before any successor reads them.
pub trait Task: Send {
    type Key: Hash + Eq + Copy + Debug + Send;

    /// Unique identity of this task within the group.
    fn key(&self) -> Self::Key;

    /// Keys of the tasks that depend on this one. Every listed key must
    /// belong to a task in the same group; an unknown key is a programmer
    /// error and aborts.
    fn downstream(&self) -> Vec<Self::Key>;

    /// Do the work. Called exactly once, possibly on a worker thread.
    fn run(&self);
}

struct Graph<K> {
    /// Remaining upstream completions per task.
    waiting: HashMap<K, usize>,
    /// Downstream edges per task, drained as completions arrive.
    edges: HashMap<K, Vec<K>>,
}

impl<K: Hash + Eq + Copy + Debug> Graph<K> {
    fn build<T: Task<Key = K>>(tasks: &[T]) -> Self {
        let mut waiting: HashMap<K, usize> = tasks.iter().map(|t| (t.key(), 0)).collect();
        assert_eq!(waiting.len(), tasks.len(), "duplicate task keys in the group");

        let mut edges = HashMap::with_capacity(tasks.len());
        for task in tasks {
            let downstream = task.downstream();
            for dest in &downstream {
                match waiting.get_mut(dest) {
                    Some(count) => *count += 1,
                    None => panic!("task {:?} feeds unknown task {:?}", task.key(), dest),
                }
            }
            edges.insert(task.key(), downstream);
        }
        Self { waiting, edges }
    }

    /// Record one completion and collect the tasks it released.
    fn complete(&mut self, key: K, released: &mut Vec<K>) {
        for dest in self.edges.remove(&key).unwrap_or_default() {
            let count = self
                .waiting
                .get_mut(&dest)
                .unwrap_or_else(|| panic!("completion for unknown task {:?}", dest));
            *count -= 1;
            if let Status::Eligible = Status::eligible_if(*count == 0) {
                released.push(dest);
            }
        }
    }
}

/// Execute a group of tasks in serial, in dependency order.
pub fn execute<T: Task>(tasks: Vec<T>) {
    let total = tasks.len();
    let mut graph = Graph::build(&tasks);

    let mut pending: HashMap<T::Key, T> = HashMap::with_capacity(total);
    let mut ready = VecDeque::new();
    for task in tasks {
        if graph.waiting[&task.key()] == 0 {
            ready.push_back(task);
        } else {
            pending.insert(task.key(), task);
        }
    }

    let mut completed = 0usize;
    let mut released = Vec::new();
    while let Some(task) = ready.pop_front() {
        task.run();
        completed += 1;
        released.clear();
        graph.complete(task.key(), &mut released);
        for key in &released {
            ready.push_back(pending.remove(key).expect("released task missing"));
        }
    }
    assert_eq!(completed, total, "task graph contains a cycle");
    debug!("serial executor retired {} tasks", completed);
}

/// Execute a group of tasks on the Rayon thread pool. The calling thread
/// coordinates: it issues eligible tasks into the FIFO scope and blocks on
/// a completion channel, releasing successors as their predecessors retire.
pub fn execute_rayon<T: Task>(tasks: Vec<T>) {
    assert!(
        rayon::current_num_threads() >= 2,
        "schedule::execute_rayon requires the Rayon pool to be running at least two threads"
    );
    let (done_sink, done_source) = crossbeam_channel::unbounded();

    rayon::scope_fifo(|scope| {
        let spawn = |task: T| {
            let done_sink = done_sink.clone();
            scope.spawn_fifo(move |_| {
                task.run();
                done_sink.send(task.key()).expect("completion channel closed");
            });
        };
        coordinate(tasks, spawn, &done_source);
    });
}

/// Execute a group of tasks on a dedicated pool of worker threads, one
/// pinned per physical core where the platform reports them. Workers drain
/// a shared injector channel, so scheduling is first-come first-served.
pub fn execute_pool<T: Task>(tasks: Vec<T>, num_threads: usize) {
    assert!(num_threads >= 1, "pool executor needs at least one worker");
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();

    std::thread::scope(|scope| {
        let (job_sink, job_source) = crossbeam_channel::unbounded::<T>();
        let (done_sink, done_source) = crossbeam_channel::unbounded();

        for n in 0..num_threads {
            let jobs = job_source.clone();
            let done = done_sink.clone();
            let core = (!core_ids.is_empty()).then(|| core_ids[n % core_ids.len()]);
            scope.spawn(move || {
                if let Some(id) = core {
                    core_affinity::set_for_current(id);
                }
                for task in jobs {
                    task.run();
                    done.send(task.key()).expect("completion channel closed");
                }
            });
        }

        coordinate(tasks, |task| job_sink.send(task).expect("worker pool gone"), &done_source);
        drop(job_sink);
    });
}

/// The shared coordinator: seed the zero-dependency tasks, then hand out
/// each remaining task the moment its last upstream completion lands.
fn coordinate<T, S>(tasks: Vec<T>, sink: S, done: &Receiver<T::Key>)
where
    T: Task,
    S: Fn(T),
{
    let total = tasks.len();
    if total == 0 {
        return;
    }
    let mut graph = Graph::build(&tasks);

    let mut pending: HashMap<T::Key, T> = HashMap::with_capacity(total);
    let mut issued = 0usize;
    for task in tasks {
        if graph.waiting[&task.key()] == 0 {
            sink(task);
            issued += 1;
        } else {
            pending.insert(task.key(), task);
        }
    }
    assert!(issued > 0, "task graph has no entry points");

    let mut completed = 0usize;
    let mut released = Vec::new();
    while completed < total {
        let key = done.recv().expect("worker dropped its completion channel");
        completed += 1;
        released.clear();
        graph.complete(key, &mut released);
        for key in &released {
            sink(pending.remove(key).expect("released task missing"));
        }
    }
    assert!(pending.is_empty(), "task graph contains a cycle");
}
