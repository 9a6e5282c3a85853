// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ordered `tracestate` member list.
//!
//! The W3C `tracestate` header is a comma-separated list of `key=value` members in which
//! order matters: middle-boxes and the backend reliably read only the first member, so the
//! owning vendor moves its key to the front every time it mutates the list.
//!
//! ```text
//! tracestate: sw=1000100010001000-01,vendor1=foo,vendor2=bar
//!             └── owned, always first  └── opaque, relative order preserved
//! ```
//!
//! [`TraceState`] keeps the members in a vector together with a key → position index.
//! Mutations remove and re-insert rather than reorder in place, and always return a new
//! value: a `TraceState` handed to a span is never changed afterwards.
//!
//! The W3C size limits (32 members, 512 characters) are deliberately not enforced here.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    /// W3C `tracestate` key: a simple key, or a `tenant@system` multi-tenant key.
    static ref VALID_KEY_REGEX: Regex = Regex::new(
        r"^(?:[a-z][_0-9a-z\-*/]{0,255}|[a-z0-9][_0-9a-z\-*/]{0,240}@[a-z][_0-9a-z\-*/]{0,13})$"
    )
    .expect("failed creating regex");

    /// W3C `tracestate` value: printable ASCII without `,` and `=`, not ending in a space.
    static ref VALID_VALUE_REGEX: Regex =
        Regex::new(r"^[\x20-\x2b\x2d-\x3c\x3e-\x7e]{0,255}[\x21-\x2b\x2d-\x3c\x3e-\x7e]$")
            .expect("failed creating regex");
}

/// Ordered list of unique `tracestate` members.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct TraceState {
    members: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl TraceState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a trace state from members in order. Later duplicates of a key are dropped.
    pub fn from_key_value<I, K, V>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut trace_state = Self::default();
        for (key, value) in members {
            let key = key.into();
            if trace_state.index.contains_key(&key) {
                debug!("Dropping duplicate tracestate key {key}");
                continue;
            }
            trace_state.index.insert(key.clone(), trace_state.members.len());
            trace_state.members.push((key, value.into()));
        }
        trace_state
    }

    /// Parses a `tracestate` header, silently dropping malformed members.
    ///
    /// Members are split on `,`, optional whitespace around each member is trimmed and each
    /// member is split on its first `=`. A member is dropped when it is empty, has no `=`,
    /// or its key or value fails the W3C grammar. Only the first occurrence of a key is kept.
    #[must_use]
    pub fn from_header(header: &str) -> Self {
        let members = header
            .split(',')
            .map(|member| member.trim_matches(|c: char| c == ' ' || c == '\t'))
            .filter(|member| !member.is_empty())
            .filter_map(|member| {
                let Some((key, value)) = member.split_once('=') else {
                    debug!("Dropping tracestate member without `=`: {member}");
                    return None;
                };
                if !is_valid_key(key) || !is_valid_value(value) {
                    debug!("Dropping malformed tracestate member: {member}");
                    return None;
                }
                Some((key, value))
            });

        Self::from_key_value(members)
    }

    /// Serializes the members as `key=value` joined by `,`, in stored order.
    #[must_use]
    pub fn header(&self) -> String {
        self.members
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&position| self.members[position].1.as_str())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.members
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(key, _)| key.as_str())
    }

    /// Sets `key` to `value` and moves it to position 0.
    ///
    /// An existing member is removed first, so every other member keeps its relative
    /// order. A missing key is simply inserted at the front.
    #[must_use]
    pub fn update_or_insert(&self, key: &str, value: &str) -> Self {
        let mut members = self.members_without(key);
        members.insert(0, (key.to_string(), value.to_string()));
        Self::from_members(members)
    }

    /// Sets `key` to `value` directly behind `anchor`, or at position 0 if `anchor` is absent.
    #[must_use]
    pub fn insert_after(&self, anchor: &str, key: &str, value: &str) -> Self {
        let mut members = self.members_without(key);
        let position = members
            .iter()
            .position(|(existing, _)| existing == anchor)
            .map_or(0, |anchor_position| anchor_position + 1);
        members.insert(position, (key.to_string(), value.to_string()));
        Self::from_members(members)
    }

    /// Removes `key`, keeping every other member in order.
    #[must_use]
    pub fn delete(&self, key: &str) -> Self {
        Self::from_members(self.members_without(key))
    }

    fn members_without(&self, key: &str) -> Vec<(String, String)> {
        self.members
            .iter()
            .filter(|(existing, _)| existing != key)
            .cloned()
            .collect()
    }

    fn from_members(members: Vec<(String, String)>) -> Self {
        let index = members
            .iter()
            .enumerate()
            .map(|(position, (key, _))| (key.clone(), position))
            .collect();
        Self { members, index }
    }
}

impl fmt::Display for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}

impl FromStr for TraceState {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_header(s))
    }
}

#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    VALID_KEY_REGEX.is_match(key)
}

#[must_use]
pub fn is_valid_value(value: &str) -> bool {
    VALID_VALUE_REGEX.is_match(value)
}
