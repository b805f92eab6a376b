use std::fmt;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use log::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    NewJob(Job),
    Terminate,
}

pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: mpsc::Sender<Message>,
}

#[derive(Debug)]
pub struct ExecutionError {
    message: String,
}

impl ExecutionError {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "Thread execution error: {}", &self.message)
    }
}

impl From<mpsc::SendError<Message>> for ExecutionError {
    fn from(send_error: mpsc::SendError<Message>) -> Self {
        let message = match send_error.0 {
            Message::NewJob(..) => "failed to send job message",
            Message::Terminate => "failed to send termination message",
        };
        ExecutionError::new(message)
    }
}

impl ThreadPool {
    /// ThreadPool manages a pool of worker threads where Jobs can be executed.
    ///
    /// # Arguments
    /// * `size`: number of worker threads in pool, at least one is started
    pub fn new(size: usize) -> ThreadPool {
        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size.max(1))
            .filter_map(|id| Worker::new(id, Arc::clone(&receiver)))
            .collect();
        ThreadPool { workers, sender }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn execute<F>(&self, f: F) -> Result<(), ExecutionError>
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Box::new(f);
        self.sender.send(Message::NewJob(job))?;
        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for _ in &self.workers {
            if let Err(e) = self.sender.send(Message::Terminate) {
                error!("{}", ExecutionError::from(e));
            }
        }

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    error!("worker {} panicked", worker.id);
                }
            }
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Message>>>) -> Option<Worker> {
        let spawned = thread::Builder::new()
            .name(format!("resthttp-worker-{}", id))
            .spawn(move || loop {
                let message = match receiver.lock() {
                    Ok(receiver) => receiver.recv(),
                    Err(_) => break,
                };
                match message {
                    Ok(Message::NewJob(job)) => job(),
                    Ok(Message::Terminate) | Err(_) => break,
                }
            });
        match spawned {
            Ok(thread) => {
                debug!("started worker {}", id);
                Some(Worker {
                    id,
                    thread: Some(thread),
                })
            }
            Err(e) => {
                error!("cannot start worker {}: {}", id, e);
                None
            }
        }
    }
}
