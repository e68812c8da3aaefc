// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted per-device session state.
//!
//! A [`SessionRecord`] holds all sessions negotiated with one remote device, keyed by their base
//! key. At most one of them is "open" and used for encryption, closed sessions are kept around to
//! decrypt late messages until they get evicted.
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::crypto::Secret;
use crate::crypto::x25519::{KeyPair, PublicKey};
use crate::key_bundle::{PreKeyId, SignedPreKeyId};

/// Version of the serialized record format.
pub const SESSION_RECORD_VERSION: &str = "v1";

pub const ROOT_KEY_SIZE: usize = 32;

pub const CHAIN_KEY_SIZE: usize = 32;

pub const MESSAGE_KEY_SIZE: usize = 32;

/// Milliseconds since UNIX epoch.
pub type Timestamp = u64;

pub(crate) fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as Timestamp)
        .unwrap_or_default()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Sending,
    Receiving,
}

/// Whether we or the remote party created the base key of a session, in other words who
/// initiated it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseKeyType {
    Ours,
    Theirs,
}

/// Current key of a chain and the counter of the last message key derived from it.
///
/// The counter starts at -1. A chain without key is closed, no further message keys can be
/// derived from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainKey {
    pub(crate) counter: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) key: Option<Secret<CHAIN_KEY_SIZE>>,
}

/// Symmetric-key ratchet of one ephemeral key epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub(crate) chain_key: ChainKey,
    pub(crate) chain_type: ChainType,

    /// Derived but not yet used message keys, by counter.
    pub(crate) message_keys: BTreeMap<u32, Secret<MESSAGE_KEY_SIZE>>,
}

impl Chain {
    pub(crate) fn new(key: [u8; CHAIN_KEY_SIZE], chain_type: ChainType) -> Self {
        Self {
            chain_key: ChainKey {
                counter: -1,
                key: Some(Secret::from_bytes(key)),
            },
            chain_type,
            message_keys: BTreeMap::new(),
        }
    }

    pub fn chain_type(&self) -> ChainType {
        self.chain_type
    }

    /// Counter of the last derived message key, -1 if none was derived yet.
    pub fn counter(&self) -> i64 {
        self.chain_key.counter
    }

    pub fn is_closed(&self) -> bool {
        self.chain_key.key.is_none()
    }

    pub fn has_message_key(&self, counter: u32) -> bool {
        self.message_keys.contains_key(&counter)
    }

    pub(crate) fn close(&mut self) {
        self.chain_key.key = None;
    }
}

/// Anchor of the current sending and receiving epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ratchet {
    pub(crate) root_key: Secret<ROOT_KEY_SIZE>,
    pub(crate) ephemeral_key_pair: KeyPair,
    pub(crate) last_remote_ephemeral_key: PublicKey,

    /// Length of our previous sending chain, announced to the remote party so it can derive keys
    /// of skipped messages.
    pub(crate) previous_counter: u32,
}

impl Ratchet {
    pub fn ephemeral_public_key(&self) -> &PublicKey {
        self.ephemeral_key_pair.public_key()
    }

    pub fn last_remote_ephemeral_key(&self) -> &PublicKey {
        &self.last_remote_ephemeral_key
    }

    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    #[cfg(test)]
    pub(crate) fn root_key(&self) -> &[u8; ROOT_KEY_SIZE] {
        self.root_key.as_bytes()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub(crate) remote_identity_key: PublicKey,
    pub(crate) base_key: PublicKey,
    pub(crate) base_key_type: BaseKeyType,

    /// Time the session was closed, `None` for the open session. Persisted as -1 when open.
    #[serde(with = "closed_timestamp")]
    pub(crate) closed: Option<Timestamp>,
}

impl IndexInfo {
    pub fn remote_identity_key(&self) -> &PublicKey {
        &self.remote_identity_key
    }

    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    pub fn base_key_type(&self) -> BaseKeyType {
        self.base_key_type
    }

    pub fn closed(&self) -> Option<Timestamp> {
        self.closed
    }
}

mod closed_timestamp {
    use super::*;

    const OPEN: i64 = -1;

    pub fn serialize<S>(closed: &Option<Timestamp>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match closed {
            Some(timestamp) => {
                let timestamp = i64::try_from(*timestamp).map_err(serde::ser::Error::custom)?;
                serializer.serialize_i64(timestamp)
            }
            None => serializer.serialize_i64(OPEN),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        if value == OPEN {
            return Ok(None);
        }
        Timestamp::try_from(value)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

/// Receiving chain which was closed after the remote party moved on to a new ephemeral key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OldRatchet {
    pub(crate) added: Timestamp,
    pub(crate) ephemeral_key: PublicKey,
}

/// Marks that outgoing messages still need to carry the handshake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPreKey {
    pub(crate) signed_key_id: SignedPreKeyId,
    pub(crate) base_key: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) pre_key_id: Option<PreKeyId>,
}

impl PendingPreKey {
    pub fn signed_key_id(&self) -> SignedPreKeyId {
        self.signed_key_id
    }

    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    pub fn pre_key_id(&self) -> Option<PreKeyId> {
        self.pre_key_id
    }
}

/// One negotiated session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub(crate) registration_id: Option<u32>,
    pub(crate) current_ratchet: Ratchet,
    pub(crate) index_info: IndexInfo,
    #[serde(default)]
    pub(crate) old_ratchet_list: Vec<OldRatchet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) pending_pre_key: Option<PendingPreKey>,

    /// Chains keyed by the ephemeral public key which originated them.
    #[serde(default)]
    pub(crate) chains: HashMap<PublicKey, Chain>,
}

impl SessionState {
    pub(crate) fn new(
        registration_id: Option<u32>,
        current_ratchet: Ratchet,
        index_info: IndexInfo,
    ) -> Self {
        Self {
            registration_id,
            current_ratchet,
            index_info,
            old_ratchet_list: Vec::new(),
            pending_pre_key: None,
            chains: HashMap::new(),
        }
    }

    /// Registration id of the remote device.
    pub fn registration_id(&self) -> Option<u32> {
        self.registration_id
    }

    pub fn current_ratchet(&self) -> &Ratchet {
        &self.current_ratchet
    }

    pub fn index_info(&self) -> &IndexInfo {
        &self.index_info
    }

    pub fn base_key(&self) -> &PublicKey {
        &self.index_info.base_key
    }

    pub fn is_open(&self) -> bool {
        self.index_info.closed.is_none()
    }

    pub fn pending_pre_key(&self) -> Option<&PendingPreKey> {
        self.pending_pre_key.as_ref()
    }

    pub fn old_ratchets(&self) -> &[OldRatchet] {
        &self.old_ratchet_list
    }

    pub fn chain(&self, ephemeral_key: &PublicKey) -> Option<&Chain> {
        self.chains.get(ephemeral_key)
    }

    pub(crate) fn chain_mut(&mut self, ephemeral_key: &PublicKey) -> Option<&mut Chain> {
        self.chains.get_mut(ephemeral_key)
    }
}

/// All sessions with one remote device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    sessions: HashMap<PublicKey, SessionState>,
    config: SessionConfig,
}

#[derive(Serialize)]
struct SerializedRecord<'a> {
    sessions: &'a HashMap<PublicKey, SessionState>,
    version: &'a str,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    pub fn serialize(&self) -> Result<String, RecordError> {
        let record = SerializedRecord {
            sessions: &self.sessions,
            version: SESSION_RECORD_VERSION,
        };
        Ok(serde_json::to_string(&record)?)
    }

    pub fn deserialize(serialized: &str) -> Result<Self, RecordError> {
        Self::deserialize_with_config(serialized, SessionConfig::default())
    }

    /// Parses a serialized record, migrating it from older formats first if necessary.
    pub fn deserialize_with_config(
        serialized: &str,
        config: SessionConfig,
    ) -> Result<Self, RecordError> {
        let mut data: Value = serde_json::from_str(serialized)?;

        let version = data.get("version").and_then(Value::as_str);
        if version != Some(SESSION_RECORD_VERSION) {
            migrate(&mut data)?;
        }

        let sessions = match data.get_mut("sessions").map(Value::take) {
            Some(sessions @ Value::Object(_)) => serde_json::from_value(sessions)?,
            _ => return Err(RecordError::InvalidSessions),
        };

        Ok(Self { sessions, config })
    }

    /// Returns `true` if there is an open session with a known registration id.
    pub fn have_open_session(&self) -> Result<bool, RecordError> {
        Ok(self
            .get_open_session()?
            .is_some_and(|session| session.registration_id.is_some()))
    }

    /// Looks up a session by its base key.
    ///
    /// Sessions we initiated are never returned, a remote party replaying our own base key back
    /// at us must not match them.
    pub fn get_session_by_base_key(&self, base_key: &PublicKey) -> Option<&SessionState> {
        let session = self.sessions.get(base_key)?;
        if session.index_info.base_key_type == BaseKeyType::Ours {
            debug!("tried to lookup a session using our base key");
            return None;
        }
        Some(session)
    }

    /// Returns the session holding a chain for the given remote ephemeral key, falls back to the
    /// open session.
    pub fn get_session_by_remote_ephemeral_key(
        &self,
        remote_ephemeral_key: &PublicKey,
    ) -> Result<Option<&SessionState>, RecordError> {
        self.detect_duplicate_open_sessions()?;

        if let Some(session) = self
            .sessions
            .values()
            .find(|session| session.chains.contains_key(remote_ephemeral_key))
        {
            return Ok(Some(session));
        }

        self.get_open_session()
    }

    pub fn get_open_session(&self) -> Result<Option<&SessionState>, RecordError> {
        self.detect_duplicate_open_sessions()?;
        Ok(self.sessions.values().find(|session| session.is_open()))
    }

    fn detect_duplicate_open_sessions(&self) -> Result<(), RecordError> {
        let open = self
            .sessions
            .values()
            .filter(|session| session.is_open())
            .count();
        if open > 1 {
            return Err(RecordError::MultipleOpenSessions);
        }
        Ok(())
    }

    /// All sessions ordered by the time they were closed, followed by the open session.
    pub fn get_sessions(&self) -> Vec<&SessionState> {
        let mut sessions: Vec<&SessionState> = self.sessions.values().collect();
        // Open sessions have no closing time and sort last.
        sessions.sort_by_key(|session| session.index_info.closed.unwrap_or(Timestamp::MAX));
        sessions
    }

    /// Inserts or replaces a session and enforces the retention policies.
    pub fn update_session_state(&mut self, mut session: SessionState) {
        self.remove_old_chains(&mut session);
        self.sessions.insert(session.index_info.base_key, session);
        self.remove_old_sessions();
    }

    /// Closes the current open session, if any.
    pub fn archive_current_state(&mut self) -> Result<(), RecordError> {
        let Some(session) = self.get_open_session()? else {
            return Ok(());
        };

        debug!(base_key = %session.index_info.base_key, "closing session");
        let mut session = session.clone();
        session.index_info.closed = Some(now());
        self.update_session_state(session);
        Ok(())
    }

    /// Makes the given session the open one.
    ///
    /// Callers archive the current open session first.
    pub fn promote_state(&mut self, mut session: SessionState) {
        debug!(base_key = %session.index_info.base_key, "promoting session");
        session.index_info.closed = None;
        self.update_session_state(session);
    }

    pub fn delete_all_sessions(&mut self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sending chains are removed when the ratchet steps, receiving chains are listed in the old
    /// ratchets of the session. Only the newest of them are retained.
    fn remove_old_chains(&self, session: &mut SessionState) {
        while session.old_ratchet_list.len() > self.config.max_old_ratchets {
            let Some((index, oldest)) = session
                .old_ratchet_list
                .iter()
                .enumerate()
                .min_by_key(|(_, old_ratchet)| old_ratchet.added)
            else {
                break;
            };

            debug!(closed_at = oldest.added, "deleting chain");
            let ephemeral_key = oldest.ephemeral_key;
            session.chains.remove(&ephemeral_key);
            session.old_ratchet_list.remove(index);
        }
    }

    fn remove_old_sessions(&mut self) {
        while self.sessions.len() > self.config.max_archived_sessions {
            let Some((base_key, closed)) = self
                .sessions
                .iter()
                .filter_map(|(base_key, session)| {
                    session.index_info.closed.map(|closed| (*base_key, closed))
                })
                .min_by_key(|(_, closed)| *closed)
            else {
                break;
            };

            debug!(closed_at = closed, "deleting session");
            self.sessions.remove(&base_key);
        }
    }
}

struct Migration {
    version: &'static str,
    migrate: fn(&mut Value),
}

/// Migrations in the order they need to be applied, each one upgrades to its version.
const MIGRATIONS: [Migration; 1] = [Migration {
    version: "v1",
    migrate: migrate_v1,
}];

/// Runs all migrations following the version of the record, or all of them if the record has
/// none.
fn migrate(data: &mut Value) -> Result<(), RecordError> {
    let version = data
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let mut run = version.is_none();
    for migration in &MIGRATIONS {
        if run {
            debug!(version = migration.version, "migrating session record");
            (migration.migrate)(data);
        } else if version.as_deref() == Some(migration.version) {
            run = true;
        }
    }

    if !run {
        return Err(RecordError::Migration(version));
    }
    Ok(())
}

/// Records before "v1" kept the registration id of the remote device on the record itself.
fn migrate_v1(data: &mut Value) {
    let registration_id = data
        .get("registrationId")
        .and_then(Value::as_u64)
        .filter(|id| *id != 0);

    let Some(sessions) = data.get_mut("sessions").and_then(Value::as_object_mut) else {
        return;
    };

    match registration_id {
        Some(registration_id) => {
            for session in sessions.values_mut().filter_map(Value::as_object_mut) {
                let missing = session
                    .get("registrationId")
                    .is_none_or(|id| id.is_null() || id.as_u64() == Some(0));
                if missing {
                    session.insert("registrationId".into(), Value::from(registration_id));
                }
            }
        }
        None => {
            let open_sessions = sessions
                .values()
                .filter(|session| {
                    session.pointer("/indexInfo/closed").and_then(Value::as_i64) == Some(-1)
                })
                .count();
            if open_sessions > 0 {
                warn!("session record migration to v1: no registration id for open session");
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("error deserializing session record: sessions need to be a map")]
    InvalidSessions,

    #[error("error migrating session record from version {0:?}")]
    Migration(Option<String>),

    #[error("datastore inconsistency: multiple open sessions")]
    MultipleOpenSessions,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::SessionConfig;
    use crate::crypto::Crypto;
    use crate::crypto::Secret;
    use crate::crypto::x25519::PublicKey;
    use crate::traits::CryptoProvider;

    use super::{
        BaseKeyType, Chain, ChainType, IndexInfo, OldRatchet, Ratchet, RecordError,
        SessionRecord, SessionState, Timestamp,
    };

    fn session(
        crypto: &Crypto,
        base_key_type: BaseKeyType,
        closed: Option<Timestamp>,
    ) -> SessionState {
        let base_key = *crypto.create_key_pair().unwrap().public_key();
        let ratchet = Ratchet {
            root_key: Secret::from_bytes(crypto.random_array().unwrap()),
            ephemeral_key_pair: crypto.create_key_pair().unwrap(),
            last_remote_ephemeral_key: base_key,
            previous_counter: 0,
        };
        let index_info = IndexInfo {
            remote_identity_key: *crypto.create_key_pair().unwrap().public_key(),
            base_key,
            base_key_type,
            closed,
        };
        SessionState::new(Some(1234), ratchet, index_info)
    }

    #[test]
    fn serialize_deserialize() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut record = SessionRecord::new();

        let mut open = session(&crypto, BaseKeyType::Theirs, None);
        let ephemeral_key = *crypto.create_key_pair().unwrap().public_key();
        let mut chain = Chain::new(crypto.random_array().unwrap(), ChainType::Receiving);
        chain.chain_key.counter = 2;
        chain
            .message_keys
            .insert(1, Secret::from_bytes(crypto.random_array().unwrap()));
        open.chains.insert(ephemeral_key, chain);
        open.old_ratchet_list.push(OldRatchet {
            added: 5,
            ephemeral_key,
        });
        record.update_session_state(open);
        record.update_session_state(session(&crypto, BaseKeyType::Ours, Some(100)));

        let serialized = record.serialize().unwrap();
        let value: serde_json::Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(value["version"], "v1");

        let deserialized = SessionRecord::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, record);
    }

    #[test]
    fn closed_is_persisted_as_minus_one() {
        let crypto = Crypto::from_seed([1; 32]);
        let open = session(&crypto, BaseKeyType::Theirs, None);
        let closed = session(&crypto, BaseKeyType::Theirs, Some(42));

        let open = serde_json::to_value(open.index_info()).unwrap();
        let closed = serde_json::to_value(closed.index_info()).unwrap();
        assert_eq!(open["closed"], -1);
        assert_eq!(closed["closed"], 42);
    }

    #[test]
    fn migrate_registration_id() {
        let crypto = Crypto::from_seed([1; 32]);

        let mut state = serde_json::to_value(session(&crypto, BaseKeyType::Theirs, None)).unwrap();
        state["registrationId"] = serde_json::Value::Null;
        let base_key = state["indexInfo"]["baseKey"].as_str().unwrap().to_owned();

        // Records without version kept the registration id on the record.
        let legacy = json!({
            "sessions": { base_key.clone(): state },
            "registrationId": 4321,
        });

        let record = SessionRecord::deserialize(&legacy.to_string()).unwrap();
        let base_key: PublicKey = base_key.parse().unwrap();
        assert_eq!(
            record
                .get_session_by_base_key(&base_key)
                .unwrap()
                .registration_id(),
            Some(4321)
        );
        assert!(record.have_open_session().unwrap());

        // Without any registration id the session can't be used for a known device.
        let mut legacy = legacy;
        legacy.as_object_mut().unwrap().remove("registrationId");
        let record = SessionRecord::deserialize(&legacy.to_string()).unwrap();
        assert!(record.get_open_session().unwrap().is_some());
        assert!(!record.have_open_session().unwrap());
    }

    #[test]
    fn invalid_records() {
        assert!(matches!(
            SessionRecord::deserialize(r#"{"sessions": {}, "version": "v0"}"#),
            Err(RecordError::Migration(Some(_)))
        ));
        assert!(matches!(
            SessionRecord::deserialize(r#"{"sessions": [], "version": "v1"}"#),
            Err(RecordError::InvalidSessions)
        ));
        assert!(matches!(
            SessionRecord::deserialize(r#"{"version": "v1"}"#),
            Err(RecordError::InvalidSessions)
        ));
        assert!(matches!(
            SessionRecord::deserialize("not json"),
            Err(RecordError::Json(_))
        ));
    }

    #[test]
    fn multiple_open_sessions() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut record = SessionRecord::new();
        record.update_session_state(session(&crypto, BaseKeyType::Theirs, None));
        record.update_session_state(session(&crypto, BaseKeyType::Theirs, None));

        assert!(matches!(
            record.get_open_session(),
            Err(RecordError::MultipleOpenSessions)
        ));
        assert!(matches!(
            record.archive_current_state(),
            Err(RecordError::MultipleOpenSessions)
        ));
    }

    #[test]
    fn lookup_by_base_key() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut record = SessionRecord::new();

        let ours = session(&crypto, BaseKeyType::Ours, None);
        let theirs = session(&crypto, BaseKeyType::Theirs, Some(1));
        let ours_base_key = *ours.base_key();
        let theirs_base_key = *theirs.base_key();
        record.update_session_state(ours);
        record.update_session_state(theirs);

        assert!(record.get_session_by_base_key(&ours_base_key).is_none());
        assert_eq!(
            record
                .get_session_by_base_key(&theirs_base_key)
                .unwrap()
                .base_key(),
            &theirs_base_key
        );
    }

    #[test]
    fn lookup_by_remote_ephemeral_key() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut record = SessionRecord::new();

        let open = session(&crypto, BaseKeyType::Theirs, None);
        let open_base_key = *open.base_key();
        let mut closed = session(&crypto, BaseKeyType::Theirs, Some(1));
        let ephemeral_key = *crypto.create_key_pair().unwrap().public_key();
        closed.chains.insert(
            ephemeral_key,
            Chain::new(crypto.random_array().unwrap(), ChainType::Receiving),
        );
        let closed_base_key = *closed.base_key();
        record.update_session_state(open);
        record.update_session_state(closed);

        let found = record
            .get_session_by_remote_ephemeral_key(&ephemeral_key)
            .unwrap()
            .unwrap();
        assert_eq!(found.base_key(), &closed_base_key);

        // Falls back to the open session.
        let unknown = *crypto.create_key_pair().unwrap().public_key();
        let found = record
            .get_session_by_remote_ephemeral_key(&unknown)
            .unwrap()
            .unwrap();
        assert_eq!(found.base_key(), &open_base_key);
    }

    #[test]
    fn sessions_ordered_by_closing_time() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut record = SessionRecord::new();

        record.update_session_state(session(&crypto, BaseKeyType::Theirs, Some(30)));
        record.update_session_state(session(&crypto, BaseKeyType::Ours, None));
        record.update_session_state(session(&crypto, BaseKeyType::Theirs, Some(10)));
        record.update_session_state(session(&crypto, BaseKeyType::Theirs, Some(20)));

        let closed: Vec<_> = record
            .get_sessions()
            .iter()
            .map(|session| session.index_info().closed())
            .collect();
        assert_eq!(closed, vec![Some(10), Some(20), Some(30), None]);
    }

    #[test]
    fn archive_and_promote() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut record = SessionRecord::new();

        // Archiving without open session is a no-op.
        record.archive_current_state().unwrap();
        assert!(record.is_empty());

        let first = session(&crypto, BaseKeyType::Theirs, None);
        let first_base_key = *first.base_key();
        record.update_session_state(first);
        record.archive_current_state().unwrap();
        assert!(record.get_open_session().unwrap().is_none());

        let second = session(&crypto, BaseKeyType::Theirs, None);
        record.update_session_state(second);

        let first = record
            .get_session_by_base_key(&first_base_key)
            .unwrap()
            .clone();
        assert!(!first.is_open());

        record.archive_current_state().unwrap();
        record.promote_state(first);
        assert_eq!(
            record.get_open_session().unwrap().unwrap().base_key(),
            &first_base_key
        );
        assert_eq!(record.len(), 2);

        record.delete_all_sessions();
        assert!(record.is_empty());
    }

    #[test]
    fn evict_oldest_chains() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut record = SessionRecord::with_config(SessionConfig {
            max_old_ratchets: 3,
            ..SessionConfig::default()
        });

        let mut state = session(&crypto, BaseKeyType::Theirs, None);
        let mut keys = Vec::new();
        for added in [50, 10, 40, 20, 30] {
            let ephemeral_key = *crypto.create_key_pair().unwrap().public_key();
            let mut chain = Chain::new(crypto.random_array().unwrap(), ChainType::Receiving);
            chain.close();
            state.chains.insert(ephemeral_key, chain);
            state.old_ratchet_list.push(OldRatchet {
                added,
                ephemeral_key,
            });
            keys.push((added, ephemeral_key));
        }
        let base_key = *state.base_key();
        record.update_session_state(state);

        let state = record.get_session_by_base_key(&base_key).unwrap();
        let mut added: Vec<_> = state.old_ratchets().iter().map(|r| r.added).collect();
        added.sort();
        assert_eq!(added, vec![30, 40, 50]);

        for (added, ephemeral_key) in keys {
            assert_eq!(state.chain(&ephemeral_key).is_some(), added >= 30);
        }
    }

    #[test]
    fn evict_oldest_closed_sessions() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut record = SessionRecord::new();

        let open = session(&crypto, BaseKeyType::Ours, None);
        let open_base_key = *open.base_key();
        record.update_session_state(open);

        for closed in 1..=45 {
            record.update_session_state(session(&crypto, BaseKeyType::Theirs, Some(closed)));
        }

        assert_eq!(record.len(), 40);
        assert_eq!(
            record.get_open_session().unwrap().unwrap().base_key(),
            &open_base_key
        );

        // The six oldest closed sessions were evicted.
        let oldest = record.get_sessions()[0].index_info().closed();
        assert_eq!(oldest, Some(7));
    }
}
