use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

type JobBox = Box<dyn FnOnce() + Send>;

pub(crate) enum LoaderOrder {
    Decode(JobBox),
    Die,
}

/// Worker threads that run asset decode jobs off the owning thread.
/// Jobs report back through whatever channel they capture; the pool
/// itself only executes them.
pub(crate) struct LoaderPool {
    order_tx: Sender<LoaderOrder>,
    worker_joins: Vec<JoinHandle<()>>,
}

impl LoaderPool {
    pub(crate) fn new(worker_count: usize) -> Self {
        let worker_count = usize::max(1, worker_count);
        let (order_tx, order_rx) = crossbeam_channel::unbounded();

        let mut worker_joins = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let order_rx = order_rx.clone();
            worker_joins.push(
                std::thread::Builder::new()
                    .name(format!("asset loader {}", index))
                    .spawn(move || worker(order_rx))
                    .unwrap(),
            );
        }
        log::info!("{} threads are spawned for the loader pool", worker_count);

        Self {
            order_tx,
            worker_joins,
        }
    }

    pub(crate) fn submit(&self, job: JobBox) {
        // the receivers live in the workers, which are only joined in drop
        self.order_tx.send(LoaderOrder::Decode(job)).unwrap();
    }
}

fn worker(order_rx: Receiver<LoaderOrder>) {
    loop {
        match order_rx.recv() {
            Ok(LoaderOrder::Decode(job)) => job(),
            Ok(LoaderOrder::Die) | Err(_) => break,
        }
    }
}

impl Drop for LoaderPool {
    fn drop(&mut self) {
        for _ in 0..self.worker_joins.len() {
            let _ = self.order_tx.send(LoaderOrder::Die);
        }
        while let Some(join) = self.worker_joins.pop() {
            let _ = join.join();
        }
    }
}
