//! Common test utilities for the integration scenarios
//!
//! A small message corpus plus helpers for building APIs over the
//! in-memory and SQLite stores.

#![allow(dead_code)]

use lexigraph::{
    Config, Direction, GraphStore, KnowledgeApi, MemoryStore, OpenStore, OwnerId,
    ProcessTextRequest, SqliteStore,
};
use std::path::Path;
use std::sync::Arc;

/// One message in a scripted conversation
#[derive(Debug, Clone, Copy)]
pub struct Message {
    pub source_id: &'static str,
    pub direction: Direction,
    pub text: &'static str,
}

/// The SEO thread: the owner sends a proposal, then reads the reply.
pub const SEO_THREAD: &[Message] = &[
    Message {
        source_id: "mail-1",
        direction: Direction::Sent,
        text: "Sent the SEO proposal to Tanaka",
    },
    Message {
        source_id: "mail-2",
        direction: Direction::Received,
        text: "Tanaka replied about SEO timeline",
    },
];

/// A mixed-script thread touching one project
pub const PHOENIX_THREAD: &[Message] = &[
    Message {
        source_id: "chat-1",
        direction: Direction::Received,
        text: "Kickoff for Project Phoenix next week with Dr. Jane Doe",
    },
    Message {
        source_id: "chat-2",
        direction: Direction::Sent,
        text: "Phoenix project: moving the API to GraphQL",
    },
    Message {
        source_id: "chat-3",
        direction: Direction::Sent,
        text: "田中さんにGraphQLの設計書を送りました",
    },
];

pub fn owner() -> OwnerId {
    OwnerId::from("owner-1")
}

pub fn request(message: &Message, owner: &OwnerId) -> ProcessTextRequest {
    ProcessTextRequest::new(
        message.text,
        "message",
        message.source_id,
        message.direction,
        owner.clone(),
    )
}

pub fn memory_api() -> KnowledgeApi {
    KnowledgeApi::in_memory(Config::default())
}

pub fn sqlite_store(path: &Path) -> Arc<dyn GraphStore> {
    Arc::new(SqliteStore::open(path).expect("open sqlite store"))
}

pub fn sqlite_api(path: &Path) -> KnowledgeApi {
    KnowledgeApi::new(sqlite_store(path), None, Config::default())
}

pub fn memory_store() -> Arc<dyn GraphStore> {
    Arc::new(MemoryStore::new())
}
