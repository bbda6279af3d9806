use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use forkwatch::{Fork, ForkState, TableManager};

const ROUNDS: usize = 300;

/// Counts concurrent holders of one fork; more than one at a time is a bug.
#[derive(Default)]
struct Holders {
    current: AtomicUsize,
    max: AtomicUsize,
    total: AtomicUsize,
}

impl Holders {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_fork_lock_admits_one_holder_at_a_time() {
    let fork = Arc::new(Fork::new(0));
    let holders = Arc::new(Holders::default());

    let mut tasks = Vec::new();
    for seat in 0..8 {
        let fork = fork.clone();
        let holders = holders.clone();
        tasks.push(tokio::spawn(async move {
            let mut won = 0;
            while won < ROUNDS / 10 {
                if fork.try_acquire(seat, Duration::from_millis(20)).await {
                    holders.enter();
                    tokio::task::yield_now().await;
                    holders.leave();
                    assert!(fork.release(seat).await);
                    won += 1;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    assert_eq!(holders.max.load(Ordering::SeqCst), 1);
    assert_eq!(holders.total.load(Ordering::SeqCst), 8 * (ROUNDS / 10));
    assert_eq!(fork.snapshot().await.state, ForkState::Available);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn neighbours_never_share_a_fork() {
    const N: usize = 5;
    let forks: Arc<Vec<Arc<Fork>>> = Arc::new((0..N).map(|id| Arc::new(Fork::new(id))).collect());
    let holders: Arc<Vec<Holders>> = Arc::new((0..N).map(|_| Holders::default()).collect());

    let mut tasks = Vec::new();
    for seat in 0..N {
        let forks = forks.clone();
        let holders = holders.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                // Alternate sides so both neighbours contend for every fork.
                let fork = if round % 2 == 0 { seat } else { (seat + 1) % N };
                if forks[fork].try_acquire(seat, Duration::from_millis(5)).await {
                    holders[fork].enter();
                    tokio::task::yield_now().await;
                    holders[fork].leave();
                    assert!(forks[fork].release(seat).await);
                }
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    for (id, h) in holders.iter().enumerate() {
        assert!(h.max.load(Ordering::SeqCst) <= 1, "fork {id} was shared");
    }
    for fork in forks.iter() {
        let u = fork.utilization().await;
        assert!((u.total() - 100.0).abs() < 1e-6, "fork {} total {}", u.fork, u.total());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn arbiter_never_grants_half_a_pair() {
    const N: usize = 5;
    let table = Arc::new(TableManager::new(N).unwrap());
    let holders: Arc<Vec<Holders>> = Arc::new((0..N).map(|_| Holders::default()).collect());
    let granted = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for seat in 0..N {
        let table = table.clone();
        let holders = holders.clone();
        let granted = granted.clone();
        tasks.push(tokio::spawn(async move {
            let (left, right) = (seat, (seat + 1) % N);
            for _ in 0..ROUNDS {
                if table.try_acquire_forks(seat, left, right) {
                    let status = table.status();
                    assert_eq!(status[left].owner, Some(seat));
                    assert_eq!(status[right].owner, Some(seat));
                    holders[left].enter();
                    holders[right].enter();
                    tokio::task::yield_now().await;
                    holders[left].leave();
                    holders[right].leave();
                    assert!(table.release_forks(seat, left, right));
                    granted.fetch_add(1, Ordering::SeqCst);
                } else {
                    let status = table.status();
                    assert_ne!(status[left].owner, Some(seat), "kept the left fork alone");
                    assert_ne!(status[right].owner, Some(seat), "kept the right fork alone");
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    assert!(granted.load(Ordering::SeqCst) > 0);
    for (id, h) in holders.iter().enumerate() {
        assert!(h.max.load(Ordering::SeqCst) <= 1, "fork {id} was shared");
    }
    assert!(table.status().iter().all(|f| f.state == ForkState::Available));
    for u in table.utilization() {
        assert!((u.total() - 100.0).abs() < 1e-6);
    }
}
