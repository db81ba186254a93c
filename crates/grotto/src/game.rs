//! The game actor: sole owner of the world, the characters and the loose items.
//!
//! Requests arrive as [`Task`]s on a bounded queue and are handled strictly one
//! at a time, in arrival order. The actor never awaits anything but the next
//! task; notices to connected characters are queued with `try_send`.

use grottoproto::request::{self as req, Leave, Stop};
use grottoproto::{CharacterId, Command, Location, Notice, Request};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::GameError;
use crate::items::{Inventory, Item};
use crate::registry::{Character, CharacterRegistry};
use crate::task::{Task, TaskHandle};
use crate::world::World;

/// Longest accepted `Join` name, counted in chars after trimming.
pub const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Capacity of the task queue. Submitters wait while it is full.
    pub queue_depth: usize,
    /// Bot characters placed at the spawn room on startup.
    pub npcs: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            queue_depth: 10,
            npcs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameState {
    Running,
    Stopped,
}

/// Cheap, cloneable access to a running game.
#[derive(Debug, Clone)]
pub struct GameHandle {
    tx: mpsc::Sender<Task>,
}

impl GameHandle {
    /// Queue `cmd` for the actor. Waits only while the queue is full.
    ///
    /// Once the game has stopped the returned handle is already done with
    /// [`GameError::Stopped`].
    pub async fn submit<T: Command>(&self, cmd: T) -> TaskHandle<T> {
        let request = cmd.into_request();
        let kind = request.kind();
        let (task, rx) = Task::new(request);
        match self.tx.send(task).await {
            Ok(()) => TaskHandle::pending(kind, rx),
            Err(mpsc::error::SendError(task)) => {
                TaskHandle::rejected(task.into_request(), GameError::Stopped)
            }
        }
    }

    /// Submit and wait; returns the populated request.
    pub async fn exec<T: Command>(&self, cmd: T) -> Result<T, GameError> {
        let mut handle = self.submit(cmd).await;
        handle.wait().await?;
        handle.into_inner().ok_or(GameError::Stopped)
    }

    pub async fn stop(&self) -> Result<(), GameError> {
        self.exec(Stop {}).await.map(|_| ())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct Game {
    world: World,
    chars: CharacterRegistry,
    state: GameState,
    rx: mpsc::Receiver<Task>,
}

impl Game {
    pub fn new(world: World, cfg: &GameConfig) -> (Self, GameHandle) {
        let (tx, rx) = mpsc::channel(cfg.queue_depth.max(1));
        let mut chars = CharacterRegistry::new();
        for name in &cfg.npcs {
            let npc = Character::new(name.clone(), world.spawn().clone()).bot(true);
            chars.add(npc);
        }
        let game = Self {
            world,
            chars,
            state: GameState::Running,
            rx,
        };
        (game, GameHandle { tx })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Handle tasks until a `Stop` is dequeued or every handle is dropped.
    ///
    /// Tasks still queued at that point complete with [`GameError::Stopped`].
    pub async fn run(mut self) {
        info!(
            areas = self.world.areas().len(),
            npcs = self.chars.len(),
            spawn = %self.world.spawn(),
            "game running"
        );

        while let Some(mut task) = self.rx.recv().await {
            let kind = task.request().kind();
            let ident = task.request().ident().unwrap_or_default();
            let res = self.handle(task.request_mut());
            match &res {
                Ok(()) => debug!(kind = %kind, ident = %ident, "handled"),
                Err(e) => debug!(kind = %kind, ident = %ident, err = %e, "request failed"),
            }
            let stopped = self.state == GameState::Stopped;
            if stopped {
                // Closed before the stop completes, so its caller can rely on it.
                self.rx.close();
            }
            task.complete(res);
            if stopped {
                break;
            }
        }

        self.state = GameState::Stopped;
        self.rx.close();
        let mut drained = 0usize;
        while let Ok(task) = self.rx.try_recv() {
            task.complete(Err(GameError::Stopped));
            drained += 1;
        }
        info!(characters = self.chars.len(), drained, "game stopped");
    }

    fn handle(&mut self, request: &mut Request) -> Result<(), GameError> {
        match request {
            Request::Join(r) => self.join(r),
            Request::Leave(r) => self.leave(r),
            Request::Move(r) => self.move_character(r),
            Request::Say(r) => self.say(r),
            Request::Look(r) => self.look(r),
            Request::Examine(r) => self.examine(r),
            Request::Pickup(r) => self.pickup(r),
            Request::Inventory(r) => self.inventory(r),
            Request::Stop(_) => {
                self.state = GameState::Stopped;
                Ok(())
            }
        }
    }

    fn character(&self, id: CharacterId) -> Result<&Character, GameError> {
        self.chars
            .get(id)
            .ok_or_else(|| GameError::not_found("character", id))
    }

    /// Send `notice` to everyone at `loc` except `except`; returns how many got it.
    fn notify_at(&self, loc: &Location, except: CharacterId, notice: &Notice) -> usize {
        self.chars
            .all_at(loc)
            .into_iter()
            .filter(|c| c.ident != except)
            .filter(|c| c.notify(notice.clone()))
            .count()
    }

    fn join(&mut self, r: &mut req::Join) -> Result<(), GameError> {
        let name = r.name.trim();
        if name.is_empty() {
            return Err(GameError::InvalidArgument("name is empty".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(GameError::InvalidArgument(format!(
                "name longer than {MAX_NAME_LEN} characters"
            )));
        }
        let name = name.to_string();
        let at = self.world.spawn().clone();
        self.world.room_at(&at)?;

        let c = Character::new(name.clone(), at.clone())
            .bot(r.bot)
            .with_inventory(Inventory::starter())
            .with_sink(r.sink.take());
        let id = self.chars.add(c);
        self.notify_at(&at, id, &Notice::Joined { name: name.clone() });
        info!(ident = %id, name = %name, bot = r.bot, at = %at, "character joined");

        r.ident = id;
        r.location = Some(at);
        Ok(())
    }

    fn leave(&mut self, r: &mut Leave) -> Result<(), GameError> {
        let c = self
            .chars
            .remove(r.ident)
            .ok_or_else(|| GameError::not_found("character", r.ident))?;
        self.notify_at(&c.location, c.ident, &Notice::Left { name: c.name.clone() });
        info!(ident = %c.ident, name = %c.name, "character left");
        r.name = c.name;
        Ok(())
    }

    fn move_character(&mut self, r: &mut req::Move) -> Result<(), GameError> {
        let c = self.character(r.ident)?;
        let from = c.location.clone();
        let name = c.name.clone();

        // No exit that way, or a direction off the compass: stay put.
        let here = match self.world.neighbor(&from, r.direction)? {
            Some(to) => {
                let departed = Notice::Departed {
                    name: name.clone(),
                    toward: r.direction,
                };
                self.notify_at(&from, r.ident, &departed);
                if let Some(c) = self.chars.get_mut(r.ident) {
                    c.location = to.clone();
                }
                let arrived = Notice::Arrived {
                    name,
                    from: Some(r.direction.opposite()),
                };
                self.notify_at(&to, r.ident, &arrived);
                to
            }
            None => from,
        };

        r.room = Some(self.world.room_at(&here)?.view());
        r.location = Some(here);
        Ok(())
    }

    fn say(&mut self, r: &mut req::Say) -> Result<(), GameError> {
        let text = r.text.trim();
        if text.is_empty() {
            return Err(GameError::InvalidArgument("nothing to say".to_string()));
        }
        let c = self.character(r.ident)?;
        let said = Notice::Said {
            from: c.name.clone(),
            text: text.to_string(),
        };
        r.heard = self.notify_at(&c.location, r.ident, &said);
        Ok(())
    }

    fn look(&mut self, r: &mut req::Look) -> Result<(), GameError> {
        let loc = self.character(r.ident)?.location.clone();
        r.room = Some(self.world.room_at(&loc)?.view());
        r.items = self.world.items_at(&loc).map(Item::view).collect();

        let mut names = self
            .chars
            .all_at(&loc)
            .into_iter()
            .filter(|c| c.ident != r.ident)
            .map(|c| c.name.clone())
            .collect::<Vec<_>>();
        names.sort();
        r.characters = names;
        Ok(())
    }

    fn examine(&mut self, r: &mut req::Examine) -> Result<(), GameError> {
        let description = self.describe(r.ident, r.target.trim())?;
        r.description = Some(description);
        Ok(())
    }

    /// Loose items first, then the inventory, then characters, then the room.
    fn describe(&self, id: CharacterId, target: &str) -> Result<String, GameError> {
        if target.is_empty() {
            return Err(GameError::InvalidArgument("nothing to examine".to_string()));
        }
        let c = self.character(id)?;
        let loc = &c.location;

        if let Some(item) = self.world.items_at(loc).find(|i| i.name_matches(target)) {
            return Ok(format!("{} (x{}) lies here.", item.name, item.count));
        }
        if let Some(item) = c.inventory.find(target) {
            return Ok(format!("You carry {} (x{}).", item.name, item.count));
        }
        if let Some(other) = self
            .chars
            .all_at(loc)
            .into_iter()
            .find(|o| o.ident != id && o.name.eq_ignore_ascii_case(target))
        {
            let what = if other.bot { "a bot" } else { "a traveller" };
            return Ok(format!("{} is {what}.", other.name));
        }

        let room = self.world.room_at(loc)?;
        let is_room = ["here", "room", room.short.as_str(), room.id.as_str()]
            .iter()
            .any(|t| t.eq_ignore_ascii_case(target));
        if !is_room {
            return Err(GameError::not_found("target", target));
        }
        if room.long.is_empty() {
            Ok(room.short.clone())
        } else {
            Ok(format!("{}. {}", room.short, room.long))
        }
    }

    fn pickup(&mut self, r: &mut req::Pickup) -> Result<(), GameError> {
        let c = self
            .chars
            .get_mut(r.ident)
            .ok_or_else(|| GameError::not_found("character", r.ident))?;
        let item = self
            .world
            .take_item(&c.location, &r.item)
            .ok_or_else(|| GameError::not_found("item", r.item.trim()))?;
        c.inventory.add(&item.name, item.count);
        r.picked = Some(item.view());
        Ok(())
    }

    fn inventory(&mut self, r: &mut req::Inventory) -> Result<(), GameError> {
        r.items = self.character(r.ident)?.inventory.views();
        Ok(())
    }
}
