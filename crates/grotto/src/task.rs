//! One request travelling to the game actor and its single-fire answer.

use grottoproto::{Command, Request, RequestKind};
use tokio::sync::oneshot;

use crate::error::GameError;

pub(crate) struct Completed {
    request: Request,
    result: Result<(), GameError>,
}

/// The actor's side of a submitted request.
///
/// [`Task::complete`] consumes the task, so an answer is sent at most once.
/// A task dropped without an answer reads as [`GameError::Stopped`] on the
/// waiting side.
pub struct Task {
    request: Request,
    reply: oneshot::Sender<Completed>,
}

impl Task {
    pub(crate) fn new(request: Request) -> (Self, oneshot::Receiver<Completed>) {
        let (reply, rx) = oneshot::channel();
        (Self { request, reply }, rx)
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub(crate) fn into_request(self) -> Request {
        self.request
    }

    pub fn complete(self, result: Result<(), GameError>) {
        // The submitter may have stopped waiting; nothing to do then.
        let _ = self.reply.send(Completed {
            request: self.request,
            result,
        });
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.request.kind())
            .finish_non_exhaustive()
    }
}

enum State<T> {
    Pending(oneshot::Receiver<Completed>),
    Done {
        value: Option<T>,
        result: Result<(), GameError>,
    },
}

/// The submitter's side of a task.
///
/// [`TaskHandle::wait`] may be called any number of times: the first call
/// waits for the actor, later calls return the same cached result at once.
pub struct TaskHandle<T> {
    kind: RequestKind,
    state: State<T>,
}

impl<T: Command> TaskHandle<T> {
    pub(crate) fn pending(kind: RequestKind, rx: oneshot::Receiver<Completed>) -> Self {
        Self {
            kind,
            state: State::Pending(rx),
        }
    }

    /// A handle for a request the actor never accepted.
    pub(crate) fn rejected(request: Request, err: GameError) -> Self {
        Self {
            kind: request.kind(),
            state: State::Done {
                value: T::from_request(request).ok(),
                result: Err(err),
            },
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done { .. })
    }

    pub async fn wait(&mut self) -> Result<(), GameError> {
        let rx = match &mut self.state {
            State::Done { result, .. } => return result.clone(),
            State::Pending(rx) => rx,
        };
        let (value, result) = match rx.await {
            Ok(done) => (T::from_request(done.request).ok(), done.result),
            Err(_) => (None, Err(GameError::Stopped)),
        };
        self.state = State::Done {
            value,
            result: result.clone(),
        };
        result
    }

    /// The request as populated by the actor; `None` until waited on.
    pub fn get(&self) -> Option<&T> {
        match &self.state {
            State::Done { value, .. } => value.as_ref(),
            State::Pending(_) => None,
        }
    }

    pub fn into_inner(self) -> Option<T> {
        match self.state {
            State::Done { value, .. } => value,
            State::Pending(_) => None,
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Pending(_) => "pending",
            State::Done { result: Ok(()), .. } => "ok",
            State::Done { result: Err(_), .. } => "failed",
        };
        f.debug_struct("TaskHandle")
            .field("kind", &self.kind)
            .field("state", &state)
            .finish()
    }
}
