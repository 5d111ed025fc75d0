// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! An in-memory structured store implementing [`rowguard_model::QueryExecutor`].
//!
//! Understands the filter, projection and write argument shapes the authorization engine
//! produces: logical and relation filters, `select`/`include` with nested `where` and `_count`,
//! `count`/`aggregate`/`groupBy`, and nested relation actions in `create`/`update`.

mod aggregate;
mod filter;
pub mod fixtures;
mod mutation;
mod projection;
mod store;
mod table;

pub use store::MemoryStore;
