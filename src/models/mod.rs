//! Core data models for the learning-material service.
//!
//! Stored files, media categories, byte ranges and chat messages. None of
//! these touch the network or the filesystem themselves.

pub mod conversation;
pub mod media;
pub mod range;
pub mod stored_file;
