use crossbeam::channel::{self, Receiver, Sender, TrySendError};


pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub(crate) enum Message {
    Run(Task),
    Close,
}


/// Address of one worker thread.
///
/// The slot holds at most one message. A handle only sits in the idle
/// registry while its worker is waiting on an empty slot, so delivering
/// through it never blocks.
#[derive(Clone)]
pub(crate) struct WorkerHandle {
    id: usize,
    slot: Sender<Message>,
}

impl WorkerHandle {

    pub fn new(id: usize) -> (Self, Receiver<Message>) {
        let (slot, inbox) = channel::bounded(1);
        (Self { id, slot }, inbox)
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn assign(&self, task: Task) -> Result<(), TrySendError<Message>> {
        self.slot.try_send(Message::Run(task))
    }

    pub fn close(&self) -> bool {
        self.slot.try_send(Message::Close).is_ok()
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle").field("id", &self.id).finish()
    }
}
