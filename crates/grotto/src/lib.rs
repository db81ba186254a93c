//! `grotto`: a small shared-world text adventure shard.
//!
//! All game state lives inside one [`game::Game`] actor. Everything else
//! (connection handlers, bots, admin code) talks to it through a
//! [`game::GameHandle`]: submit a request, get a [`task::TaskHandle`], wait.
//! The actor handles one task at a time, so game state needs no locks.

pub mod client;
pub mod error;
pub mod game;
pub mod items;
pub mod registry;
pub mod server;
pub mod task;
pub mod world;

pub use client::{Client, ClientError};
pub use error::GameError;
pub use game::{Game, GameConfig, GameHandle};
pub use server::{Acceptor, Server, ServerConfig, ServerError};
pub use task::TaskHandle;
pub use world::{Area, Compass, Room, World, WorldError};
