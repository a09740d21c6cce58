use crate::context::Context;
use crate::device::Factory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// The window is going away.
    Destroy,
    Resize { width: u32, height: u32 },
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    Continue,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    QuitPosted,
    Exited,
}

/// Dispatches pending messages and renders a frame whenever none is pending.
pub struct MessageLoop<F: Factory> {
    context: Context<F>,
    state: State,
    frames: u64,
}

impl<F: Factory> MessageLoop<F> {
    pub fn new(context: Context<F>) -> Self {
        MessageLoop {
            context,
            state: State::Running,
            frames: 0,
        }
    }

    #[cfg(test)]
    pub fn context(&self) -> &Context<F> {
        &self.context
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[cfg(test)]
    pub fn has_exited(&self) -> bool {
        self.state == State::Exited
    }

    pub fn step(&mut self, pending: Option<Message>) -> Pump {
        match pending {
            Some(message) => self.dispatch(message),
            None => self.idle(),
        }
    }

    pub fn dispatch(&mut self, message: Message) -> Pump {
        match (self.state, message) {
            (State::Exited, _) => return Pump::Exit,
            (State::QuitPosted, _) | (_, Message::Quit) => self.exit(),
            (State::Running, Message::Destroy) => {
                self.context.cleanup();
                self.state = State::QuitPosted;
                log::info!("window destroyed, quit posted");
            }
            (State::Running, Message::Resize { width, height }) => {
                self.context.resize(width, height);
            }
        }
        self.pump()
    }

    pub fn idle(&mut self) -> Pump {
        match self.state {
            State::Running => {
                self.context.render();
                self.frames += 1;
            }
            State::QuitPosted => self.exit(),
            State::Exited => {}
        }
        self.pump()
    }

    /// Step through `source` until the loop exits. Returns the frames rendered.
    #[cfg(test)]
    pub fn run<I>(&mut self, source: I) -> u64
    where
        I: IntoIterator<Item = Option<Message>>,
    {
        for pending in source {
            if self.step(pending) == Pump::Exit {
                break;
            }
        }
        self.frames
    }

    fn exit(&mut self) {
        self.context.cleanup();
        self.state = State::Exited;
        log::info!("message loop exited after {} frames", self.frames);
    }

    fn pump(&self) -> Pump {
        match self.state {
            State::Exited => Pump::Exit,
            _ => Pump::Continue,
        }
    }
}
