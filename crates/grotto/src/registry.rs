use std::collections::HashMap;

use grottoproto::{CharacterId, Location, Notice, NoticeSink};
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::items::Inventory;

#[derive(Debug, Clone)]
pub struct Character {
    pub ident: CharacterId,
    pub name: String,
    pub location: Location,
    pub bot: bool,
    pub inventory: Inventory,
    sink: Option<NoticeSink>,
}

impl Character {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            ident: CharacterId::UNSET,
            name: name.into(),
            location,
            bot: false,
            inventory: Inventory::new(),
            sink: None,
        }
    }

    pub fn bot(mut self, bot: bool) -> Self {
        self.bot = bot;
        self
    }

    pub fn with_inventory(mut self, inventory: Inventory) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn with_sink(mut self, sink: Option<NoticeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Queue a notice without waiting. Returns whether it was queued.
    pub fn notify(&self, notice: Notice) -> bool {
        let Some(sink) = &self.sink else {
            return false;
        };
        match sink.try_send(notice) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(ident = %self.ident, "notice sink full; dropped notice");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Characters currently in the game, keyed by an identity that is never reused.
#[derive(Debug, Default)]
pub struct CharacterRegistry {
    chars: HashMap<CharacterId, Character>,
    last_id: u64,
}

impl CharacterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `c` under a fresh identity and return it.
    pub fn add(&mut self, mut c: Character) -> CharacterId {
        self.last_id += 1;
        let id = CharacterId(self.last_id);
        c.ident = id;
        self.chars.insert(id, c);
        id
    }

    pub fn remove(&mut self, id: CharacterId) -> Option<Character> {
        self.chars.remove(&id)
    }

    pub fn get(&self, id: CharacterId) -> Option<&Character> {
        self.chars.get(&id)
    }

    pub fn get_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.chars.get_mut(&id)
    }

    /// Everyone at `loc`, in no particular order.
    pub fn all_at(&self, loc: &Location) -> Vec<&Character> {
        self.chars.values().filter(|c| &c.location == loc).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.chars.len()
    }
}
