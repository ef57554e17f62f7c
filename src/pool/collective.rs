use std::sync::Barrier;
use std::sync::Mutex;

/// Which ranks take part in a collective call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participants {
    All,
    Group(usize),
}

/// Shared state behind the collective operations of an in-process rank
/// team. Every exchange is two-phase (write, barrier, read, barrier) so
/// the structure can be reused for back-to-back collectives.
pub struct Collective {
    size: usize,
    group_size: usize,
    all: Barrier,
    groups: Vec<Barrier>,
    slots: Mutex<Vec<Vec<f64>>>,
    decision: Mutex<bool>,
}

impl Collective {
    pub fn new(size: usize, n_groups: usize) -> Self {
        assert!(size > 0, "empty rank team");
        assert!(n_groups > 0 && size % n_groups == 0, "groups must divide ranks evenly");
        let group_size = size / n_groups;
        Self {
            size,
            group_size,
            all: Barrier::new(size),
            groups: (0..n_groups).map(|_| Barrier::new(group_size)).collect(),
            slots: Mutex::new(vec![Vec::new(); size]),
            decision: Mutex::new(false),
        }
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// ranks belonging to the given participant set
    fn ranks(&self, participants: Participants) -> std::ops::Range<usize> {
        match participants {
            Participants::All => 0..self.size,
            Participants::Group(g) => g * self.group_size..(g + 1) * self.group_size,
        }
    }

    fn wait(&self, participants: Participants) {
        match participants {
            Participants::All => {
                self.all.wait();
            }
            Participants::Group(g) => {
                self.groups[g].wait();
            }
        }
    }

    /// in-place sum of the buffer across the participating ranks
    pub fn sum(&self, buffer: &mut [f64], rank: usize, participants: Participants) {
        self.slots.lock().unwrap()[rank] = buffer.to_vec();
        self.wait(participants);
        {
            let slots = self.slots.lock().unwrap();
            for (n, value) in buffer.iter_mut().enumerate() {
                *value = self.ranks(participants).map(|r| slots[r][n]).sum();
            }
        }
        self.wait(participants);
    }

    /// copy the root rank's buffer to every participating rank
    pub fn broadcast(&self, buffer: &mut [f64], rank: usize, root: usize, participants: Participants) {
        if rank == root {
            self.slots.lock().unwrap()[rank] = buffer.to_vec();
        }
        self.wait(participants);
        if rank != root {
            buffer.copy_from_slice(&self.slots.lock().unwrap()[root]);
        }
        self.wait(participants);
    }

    /// check that every participating rank holds the same value, to within
    /// a relative tolerance that absorbs cross-rank summation ulps
    pub fn equality(&self, value: f64, rank: usize, participants: Participants) -> bool {
        self.slots.lock().unwrap()[rank] = vec![value];
        self.wait(participants);
        let equal = {
            let slots = self.slots.lock().unwrap();
            let reference = slots[self.ranks(participants).start][0];
            self.ranks(participants)
                .map(|r| slots[r][0])
                .all(|v| approximately(v, reference))
        };
        self.wait(participants);
        equal
    }

    /// master states a decision, every other rank receives it
    pub fn decide(&self, choice: Option<bool>, participants: Participants) -> bool {
        if let Some(choice) = choice {
            *self.decision.lock().unwrap() = choice;
        }
        self.wait(participants);
        let decision = *self.decision.lock().unwrap();
        self.wait(participants);
        decision
    }
}

fn approximately(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()) + 1e-12
}
