//! Runners implement threading strategies for Servers: one connection is
//! one job.
use std::thread;

use log::{debug, error};

use threadpool::ThreadPool;

mod threadpool;

pub struct SimpleRunner;

impl SimpleRunner {
    pub fn run<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        f();
    }
}

pub struct ThreadRunner {
    threads: Vec<Option<thread::JoinHandle<()>>>,
}

impl Default for ThreadRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRunner {
    pub fn new() -> Self {
        Self { threads: vec![] }
    }

    pub fn run<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.threads.retain(|t| t.as_ref().map_or(false, |t| !t.is_finished()));
        match thread::Builder::new().name("resthttp-connection".to_string()).spawn(f) {
            Ok(handle) => self.threads.push(Some(handle)),
            Err(e) => error!("cannot spawn connection thread: {}", e),
        }
    }
}

impl Drop for ThreadRunner {
    fn drop(&mut self) {
        for thread in &mut self.threads {
            if let Some(thread) = thread.take() {
                match thread.join() {
                    Ok(_) => (),
                    Err(e) => error!("Error joining thread: {:?}", e),
                }
            }
        }
    }
}

pub struct ThreadPoolRunner {
    threadpool: ThreadPool,
}

impl ThreadPoolRunner {
    pub fn new(pool_size: usize) -> Self {
        debug!("starting thread pool with {} workers", pool_size);
        Self {
            threadpool: ThreadPool::new(pool_size),
        }
    }
    pub fn run<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.threadpool.execute(f) {
            Ok(_) => (),
            Err(e) => error!("thread pool error: {}", e),
        }
    }
}

pub enum Runner {
    Simple(SimpleRunner),
    Thread(ThreadRunner),
    ThreadPool(ThreadPoolRunner),
}

impl Runner {
    pub fn run<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Self::Simple(runner) => runner.run(f),
            Self::Thread(runner) => runner.run(f),
            Self::ThreadPool(runner) => runner.run(f),
        }
    }

    /// Create a new runner using the specified number of threads.
    /// 0 is infinite, a new thread will be created for each job.
    /// 1 runs in the main thread.
    /// Any other number creates a thread pool of the specified size.
    pub fn new(n_threads: usize) -> Self {
        match n_threads {
            0 => Self::Thread(ThreadRunner::new()),
            1 => Self::Simple(SimpleRunner),
            n => Self::ThreadPool(ThreadPoolRunner::new(n)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn run_jobs(n_threads: usize) -> usize {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let mut runner = Runner::new(n_threads);
            for _ in 0..5 {
                let counter = counter.clone();
                runner.run(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        counter.load(Ordering::SeqCst)
    }

    #[test]
    fn test_runners() {
        assert_eq!(run_jobs(0), 5);
        assert_eq!(run_jobs(1), 5);
        assert_eq!(run_jobs(4), 5);
    }
}
