//! The tree-structured workspace: folders, spaces, and leaf files (e.g.
//! `HttpProject`), each carrying inherited permissions and a soft-delete
//! flag mirrored into [`Bin`].

use crate::access;
use crate::error::{ApiError, Result};
use crate::events::{EventBus, NotifyFilter};
use crate::key_codec;
use crate::kv::{BatchOp, KVEngine};
use crate::model::{Event, EventOperation, File, Permission, PermissionType, Role};
use crate::patch::{apply_with_inverse, check_immutable, ops_to_value, parse_patch};
use crate::stores::bin::Bin;
use crate::stores::revisions::Revisions;
use crate::stores::shared_index::SharedIndex;
use crate::stores::{now_unix_ms, resume_or_start, ListOptions, ListPage};
use crate::cursor::CursorCodec;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

const FILES_NAMESPACE: &str = "files";
const PERMISSIONS_NAMESPACE: &str = "permissions";
const BIN_KIND: &str = "File";
const FOLDER_KINDS: &[&str] = &["Space", "Folder"];
const IMMUTABLE_PATHS: &[&str] = &["/_deleted", "/key", "/kind", "/owner", "/parents", "/permission_ids"];

/// A single mutation to a file's permission set, applied by `patch_access`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum AccessOp {
    Add { #[serde(rename = "type")] perm_type: PermissionType, id: Option<String>, role: Role },
    Remove { #[serde(rename = "type")] perm_type: PermissionType, id: Option<String> },
}

pub struct Files {
    kv: Arc<KVEngine>,
    events: Arc<EventBus>,
    revisions: Arc<Revisions>,
    bin: Arc<Bin>,
    shared: Arc<SharedIndex>,
    cursor: Arc<CursorCodec>,
}

impl Files {
    pub fn new(kv: Arc<KVEngine>, events: Arc<EventBus>, revisions: Arc<Revisions>, bin: Arc<Bin>, shared: Arc<SharedIndex>, cursor: Arc<CursorCodec>) -> Self {
        Self { kv, events, revisions, bin, shared, cursor }
    }

    fn raw_get(&self, key: &str) -> Result<Option<File>> {
        match self.kv.get(FILES_NAMESPACE, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn hydrate_permissions(&self, file: &mut File) -> Result<()> {
        let mut attached = Vec::with_capacity(file.permission_ids.len());
        for id in &file.permission_ids {
            if let Some(bytes) = self.kv.get(PERMISSIONS_NAMESPACE, id.as_bytes())? {
                attached.push(serde_json::from_slice::<Permission>(&bytes)?);
            }
        }
        file.attached_permissions = attached;
        Ok(())
    }

    /// Loads `key` with permissions attached, or `None` if missing.
    fn load(&self, key: &str) -> Result<Option<File>> {
        let mut file = match self.raw_get(key)? {
            Some(f) => f,
            None => return Ok(None),
        };
        self.hydrate_permissions(&mut file)?;
        Ok(Some(file))
    }

    /// Ancestor chain, nearest-first, each hydrated with permissions.
    fn load_ancestors(&self, file: &File) -> Result<Vec<File>> {
        let mut out = Vec::with_capacity(file.parents.len());
        for id in file.ancestors_nearest_first() {
            if let Some(ancestor) = self.load(id)? {
                out.push(ancestor);
            }
        }
        Ok(out)
    }

    /// True if `key` or any ancestor is tombstoned: a file with an
    /// ancestor soft-deleted is considered deleted too.
    fn is_effectively_deleted(&self, file: &File) -> Result<bool> {
        if file.deleted || self.bin.is_deleted(BIN_KIND, &file.key)? {
            return Ok(true);
        }
        for id in &file.parents {
            if self.bin.is_deleted(BIN_KIND, id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn resolve_role(&self, user: &str, file: &File) -> Result<Option<Role>> {
        let ancestors = self.load_ancestors(file)?;
        Ok(access::resolve(user, file, ancestors.iter(), now_unix_ms()))
    }

    fn require_role(&self, user: &str, key: &str, required: Role) -> Result<File> {
        let file = self.load(key)?.ok_or(ApiError::NotFound)?;
        if self.is_effectively_deleted(&file)? {
            return Err(ApiError::NotFound);
        }
        match self.resolve_role(user, &file)? {
            Some(role) if role >= required => Ok(file),
            Some(_) => Err(ApiError::NotAuthorized),
            None => Err(ApiError::NotFound),
        }
    }

    /// Public gate for callers outside this store (the `?alt=media` file
    /// contents route is role-gated against the same File ACL without
    /// itself being a `Files` operation).
    pub fn ensure_role(&self, user: &str, key: &str, required: Role) -> Result<File> {
        self.require_role(user, key, required)
    }

    pub fn add(&self, key: &str, kind: &str, info: Value, user: &str, parent: Option<&str>) -> Result<File> {
        if self.raw_get(key)?.is_some() {
            return Err(ApiError::Conflict(format!("file {key} already exists")));
        }

        let (parents, inherited_permission_ids, parent_file) = match parent {
            Some(parent_key) => {
                let parent_file = self
                    .load(parent_key)?
                    .ok_or_else(|| ApiError::InvalidInput(format!("parent {parent_key} does not exist")))?;
                if self.is_effectively_deleted(&parent_file)? {
                    return Err(ApiError::InvalidInput(format!("parent {parent_key} is deleted")));
                }
                if !FOLDER_KINDS.contains(&parent_file.kind.as_str()) {
                    return Err(ApiError::InvalidInput(format!("parent {parent_key} is not a folder")));
                }
                let mut parents = parent_file.parents.clone();
                parents.push(parent_key.to_string());
                (parents, parent_file.permission_ids.clone(), Some(parent_file))
            }
            None => (Vec::new(), Vec::new(), None),
        };

        let now = now_unix_ms();
        let mut file = File {
            key: key.to_string(),
            kind: kind.to_string(),
            parents,
            owner: user.to_string(),
            permission_ids: inherited_permission_ids,
            created: now,
            updated: now,
            deleted: false,
            info,
            attached_permissions: Vec::new(),
        };

        let mut ops = Vec::new();
        let has_inherited_ownership = if let Some(parent_file) = &parent_file {
            let ancestors = self.load_ancestors(parent_file)?;
            matches!(access::resolve(user, parent_file, ancestors.iter(), now), Some(Role::Owner))
        } else {
            false
        };

        if !has_inherited_ownership {
            let perm = Permission {
                key: format!("perm-{}", Uuid::new_v4()),
                perm_type: PermissionType::User,
                id: Some(user.to_string()),
                role: Role::Owner,
                adding_user: user.to_string(),
                owner: Some(user.to_string()),
                expiration_time: None,
            };
            file.permission_ids.push(perm.key.clone());
            ops.push(BatchOp::put(PERMISSIONS_NAMESPACE, perm.key.as_bytes().to_vec(), serde_json::to_vec(&perm)?));
        }

        ops.push(BatchOp::put(FILES_NAMESPACE, key.as_bytes().to_vec(), serde_json::to_vec(&file)?));
        self.kv.batch(ops)?;

        self.events.notify(
            &Event::new(EventOperation::Created, kind, key, None),
            NotifyFilter { url: "/files", users: None },
        );
        Ok(file)
    }

    /// Returns the file iff the caller has at least reader access and no
    /// ancestor is tombstoned. Missing and unauthorized both surface as
    /// `NotFound` to avoid existence leaks.
    pub fn read(&self, key: &str, user: &str) -> Result<File> {
        self.require_role(user, key, Role::Reader)
    }

    pub fn list(&self, user: &str, options: &ListOptions) -> Result<ListPage<File>> {
        let state = resume_or_start(&self.cursor, options)?;
        let limit = if state.limit == 0 { 50 } else { state.limit };

        let candidates: Vec<File> = if let Some(parent_key) = &state.parent {
            self.require_role(user, parent_key, Role::Reader)?;
            let all = self.kv.range_asc(FILES_NAMESPACE, None, None, usize::MAX)?;
            all.into_iter()
                .filter_map(|(_, v)| serde_json::from_slice::<File>(&v).ok())
                .filter(|f| f.direct_parent() == Some(parent_key.as_str()))
                .collect()
        } else {
            let owned = self.kv.range_asc(FILES_NAMESPACE, None, None, usize::MAX)?;
            let mut out: Vec<File> = owned
                .into_iter()
                .filter_map(|(_, v)| serde_json::from_slice::<File>(&v).ok())
                .filter(|f| f.owner == user)
                .collect();
            for shared in self.shared.list_for_user(user)? {
                if let Some(f) = self.raw_get(&shared.target_key)? {
                    out.push(f);
                }
            }
            out
        };

        let mut visible = Vec::new();
        for file in candidates {
            if self.is_effectively_deleted(&file)? {
                continue;
            }
            if let Some(since) = state.since {
                if file.updated < since {
                    continue;
                }
            }
            if let Some(start) = &state.last_key {
                if file.key.as_str() <= start.as_str() {
                    continue;
                }
            }
            visible.push(file);
        }
        visible.sort_by(|a, b| a.key.cmp(&b.key));
        visible.truncate(limit);

        let cursor = match visible.last() {
            Some(last) if visible.len() == limit => {
                let mut next = state.clone();
                next.last_key = Some(last.key.clone());
                Some(self.cursor.encode(&next)?)
            }
            _ => None,
        };
        Ok(ListPage { data: visible, cursor })
    }

    /// Soft-deletes the subtree: requires `owner` on `key`, flips
    /// `_deleted`, adds the bin marker, emits a `deleted` event. Descendants
    /// are not rewritten; their deletion is inferred by ancestor check.
    pub fn delete(&self, key: &str, user: &str) -> Result<()> {
        let mut file = self.require_role(user, key, Role::Owner)?;
        file.deleted = true;
        let tombstone = self.bin.build_tombstone(BIN_KIND, key, Some(user))?;
        self.kv.batch(vec![
            BatchOp::put(FILES_NAMESPACE, key.as_bytes().to_vec(), serde_json::to_vec(&file)?),
            tombstone,
        ])?;
        self.events.notify(
            &Event::new(EventOperation::Deleted, file.kind.clone(), key, None),
            NotifyFilter { url: "/files", users: None },
        );
        Ok(())
    }

    pub fn apply_patch(&self, key: &str, patch: &Value, user: &str) -> Result<Value> {
        let file = self.require_role(user, key, Role::Writer)?;
        let ops = parse_patch(patch)?;
        check_immutable(&ops, IMMUTABLE_PATHS)?;

        let doc = serde_json::to_value(&file)?;
        let (new_doc, inverse_ops) = apply_with_inverse(&doc, &ops)?;
        let mut updated: File = serde_json::from_value(new_doc)?;
        updated.updated = now_unix_ms();

        self.kv.put(FILES_NAMESPACE, key.as_bytes(), &serde_json::to_vec(&updated)?)?;
        let reverse = self.revisions.add(&file.kind, key, ops_to_value(&inverse_ops), user, false)?;

        self.events.notify(
            &Event::new(EventOperation::Patch, file.kind.clone(), key, Some(patch.clone())),
            NotifyFilter { url: &format!("/files/{key}"), users: None },
        );
        Ok(reverse.patch)
    }

    /// Requires `owner`. For each `add` that targets a user outside the
    /// ancestor set, inserts a `Shared` entry; for each `remove`, deletes
    /// the corresponding `Shared` entry if present.
    pub fn patch_access(&self, key: &str, access_ops: &[AccessOp], user: &str) -> Result<()> {
        let mut file = self.require_role(user, key, Role::Owner)?;
        let ancestor_keys: std::collections::HashSet<&str> = file.parents.iter().map(String::as_str).collect();

        let mut kv_ops = Vec::new();
        for access_op in access_ops {
            match access_op {
                AccessOp::Add { perm_type, id, role } => {
                    let perm = Permission {
                        key: format!("perm-{}", Uuid::new_v4()),
                        perm_type: *perm_type,
                        id: id.clone(),
                        role: *role,
                        adding_user: user.to_string(),
                        owner: None,
                        expiration_time: None,
                    };
                    file.permission_ids.push(perm.key.clone());
                    kv_ops.push(BatchOp::put(PERMISSIONS_NAMESPACE, perm.key.as_bytes().to_vec(), serde_json::to_vec(&perm)?));
                    if let (PermissionType::User, Some(target)) = (perm_type, id) {
                        if !ancestor_keys.contains(target.as_str()) {
                            kv_ops.push(self.shared.build_insert(target, key, &file.kind, &file.parents)?);
                        }
                    }
                }
                AccessOp::Remove { perm_type, id } => {
                    if let (PermissionType::User, Some(target)) = (perm_type, id) {
                        kv_ops.push(self.shared.build_remove(target, key)?);
                    }
                }
            }
        }
        kv_ops.push(BatchOp::put(FILES_NAMESPACE, key.as_bytes().to_vec(), serde_json::to_vec(&file)?));
        self.kv.batch(kv_ops)?;

        self.events.notify(
            &Event::new(EventOperation::AccessChange, file.kind.clone(), key, None),
            NotifyFilter { url: &format!("/files/{key}/users"), users: None },
        );
        Ok(())
    }
}

/// `del~File~<key>` form, exposed for callers (e.g. revision listing) that
/// need to short-circuit on a file's tombstone without going through
/// `Files::read`.
pub fn bin_marker_key(key: &str) -> Result<String> {
    key_codec::deleted_marker(BIN_KIND, &[key])
}
