//! Store trait implementations for SQLite.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, ToSql, params, params_from_iter};
use serde::de::DeserializeOwned;

use crate::core::{BindingStore, EnvironmentStore, NodeStore, RuleStore};
use crate::error::{EnvironmentError, NodeError, RuleError, ServiceTreeError, ServiceTreeResult};
use crate::tenant::TenantId;
use crate::types::{
    BindingFilter, BindingRule, EnvStatus, Environment, EnvironmentFilter, NodeFilter,
    NodeStatus, ResourceBinding, ResourceType, RuleFilter, TreeNode,
};

use super::SqliteBackend;
use super::backend::BACKEND_NAME;

const NODE_COLUMNS: &str = "id, uid, name, parent_id, level, path, tenant_id, owner, team, \
     description, tags, sort_order, status, create_time, update_time";

const BINDING_COLUMNS: &str =
    "id, node_id, env_id, resource_type, resource_id, tenant_id, bind_type, rule_id, create_time";

const RULE_COLUMNS: &str = "id, node_id, env_id, name, tenant_id, priority, conditions, \
     enabled, description, create_time, update_time";

const ENVIRONMENT_COLUMNS: &str = "id, code, name, tenant_id, description, color, sort_order, \
     status, create_time, update_time";

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = ServiceTreeError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<TreeNode> {
    Ok(TreeNode {
        id: row.get(0)?,
        uid: row.get(1)?,
        name: row.get(2)?,
        parent_id: row.get(3)?,
        level: row.get(4)?,
        path: row.get(5)?,
        tenant_id: TenantId::new(row.get::<_, String>(6)?),
        owner: row.get(7)?,
        team: row.get(8)?,
        description: row.get(9)?,
        tags: json_column(row, 10)?,
        order: row.get(11)?,
        status: NodeStatus::from_code(row.get(12)?),
        create_time: time_column(row, 13)?,
        update_time: time_column(row, 14)?,
    })
}

fn binding_from_row(row: &Row<'_>) -> rusqlite::Result<ResourceBinding> {
    Ok(ResourceBinding {
        id: row.get(0)?,
        node_id: row.get(1)?,
        env_id: row.get(2)?,
        resource_type: parsed_column(row, 3)?,
        resource_id: row.get(4)?,
        tenant_id: TenantId::new(row.get::<_, String>(5)?),
        bind_type: parsed_column(row, 6)?,
        rule_id: row.get(7)?,
        create_time: time_column(row, 8)?,
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<BindingRule> {
    Ok(BindingRule {
        id: row.get(0)?,
        node_id: row.get(1)?,
        env_id: row.get(2)?,
        name: row.get(3)?,
        tenant_id: TenantId::new(row.get::<_, String>(4)?),
        priority: row.get(5)?,
        conditions: json_column(row, 6)?,
        enabled: row.get(7)?,
        description: row.get(8)?,
        create_time: time_column(row, 9)?,
        update_time: time_column(row, 10)?,
    })
}

fn environment_from_row(row: &Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        tenant_id: TenantId::new(row.get::<_, String>(3)?),
        description: row.get(4)?,
        color: row.get(5)?,
        order: row.get(6)?,
        status: EnvStatus::from_code(row.get(7)?),
        create_time: time_column(row, 8)?,
        update_time: time_column(row, 9)?,
    })
}

/// `WHERE` clause assembled from optional filter criteria.
#[derive(Default)]
struct WhereClause {
    conditions: Vec<&'static str>,
    params: Vec<Box<dyn ToSql>>,
}

impl WhereClause {
    fn push(&mut self, condition: &'static str, value: impl ToSql + 'static) {
        self.conditions.push(condition);
        self.params.push(Box::new(value));
    }

    fn push_text(&mut self, condition: &'static str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.push(condition, value.to_string());
        }
    }

    fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// Appends `LIMIT ? OFFSET ?` parameters and returns the matching SQL.
    fn page(&mut self, offset: u64, limit: Option<u64>) -> &'static str {
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        self.params.push(Box::new(limit));
        self.params
            .push(Box::new(i64::try_from(offset).unwrap_or(i64::MAX)));
        " LIMIT ? OFFSET ?"
    }
}

fn node_where(filter: &NodeFilter) -> WhereClause {
    let mut clause = WhereClause::default();
    if let Some(tenant_id) = &filter.tenant_id {
        clause.push("tenant_id = ?", tenant_id.as_str().to_string());
    }
    if let Some(parent_id) = filter.parent_id {
        clause.push("parent_id = ?", parent_id);
    }
    if let Some(level) = filter.level {
        clause.push("level = ?", level);
    }
    if let Some(status) = filter.status {
        clause.push("status = ?", status.code());
    }
    clause.push_text("instr(lower(name), lower(?)) > 0", filter.name.as_deref());
    clause.push_text("owner = ?", filter.owner.as_deref());
    clause.push_text("team = ?", filter.team.as_deref());
    clause
}

fn binding_where(filter: &BindingFilter) -> WhereClause {
    let mut clause = WhereClause::default();
    if let Some(tenant_id) = &filter.tenant_id {
        clause.push("tenant_id = ?", tenant_id.as_str().to_string());
    }
    if let Some(node_id) = filter.node_id {
        clause.push("node_id = ?", node_id);
    }
    if let Some(env_id) = filter.env_id {
        clause.push("env_id = ?", env_id);
    }
    if let Some(resource_type) = filter.resource_type {
        clause.push("resource_type = ?", resource_type.as_str());
    }
    if let Some(resource_id) = filter.resource_id {
        clause.push("resource_id = ?", resource_id);
    }
    if let Some(bind_type) = filter.bind_type {
        clause.push("bind_type = ?", bind_type.as_str());
    }
    if let Some(rule_id) = filter.rule_id {
        clause.push("rule_id = ?", rule_id);
    }
    clause
}

fn rule_where(filter: &RuleFilter) -> WhereClause {
    let mut clause = WhereClause::default();
    if let Some(tenant_id) = &filter.tenant_id {
        clause.push("tenant_id = ?", tenant_id.as_str().to_string());
    }
    if let Some(node_id) = filter.node_id {
        clause.push("node_id = ?", node_id);
    }
    if let Some(enabled) = filter.enabled {
        clause.push("enabled = ?", enabled);
    }
    clause.push_text("instr(lower(name), lower(?)) > 0", filter.name.as_deref());
    clause
}

fn environment_where(filter: &EnvironmentFilter) -> WhereClause {
    let mut clause = WhereClause::default();
    if let Some(tenant_id) = &filter.tenant_id {
        clause.push("tenant_id = ?", tenant_id.as_str().to_string());
    }
    clause.push_text("code = ?", filter.code.as_deref());
    if let Some(status) = filter.status {
        clause.push("status = ?", status.code());
    }
    clause
}

fn query_list<T>(
    conn: &Connection,
    sql: &str,
    params: &[Box<dyn ToSql>],
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> ServiceTreeResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), map)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn query_count(conn: &Connection, sql: &str, params: &[Box<dyn ToSql>]) -> ServiceTreeResult<u64> {
    let count: i64 = conn.query_row(sql, params_from_iter(params.iter()), |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

fn query_optional<T>(result: rusqlite::Result<T>) -> ServiceTreeResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn insert_binding(conn: &Connection, binding: &ResourceBinding) -> rusqlite::Result<i64> {
    conn.prepare_cached(
        "INSERT INTO bindings
            (node_id, env_id, resource_type, resource_id, tenant_id, bind_type, rule_id, create_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?
    .execute(params![
        binding.node_id,
        binding.env_id,
        binding.resource_type.as_str(),
        binding.resource_id,
        binding.tenant_id.as_str(),
        binding.bind_type.as_str(),
        binding.rule_id,
        format_time(&binding.create_time),
    ])?;
    Ok(conn.last_insert_rowid())
}

fn insert_environment(conn: &Connection, env: &Environment) -> rusqlite::Result<i64> {
    conn.prepare_cached(
        "INSERT INTO environments
            (code, name, tenant_id, description, color, sort_order, status, create_time, update_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?
    .execute(params![
        env.code,
        env.name,
        env.tenant_id.as_str(),
        env.description,
        env.color,
        env.order,
        env.status.code(),
        format_time(&env.create_time),
        format_time(&env.update_time),
    ])?;
    Ok(conn.last_insert_rowid())
}

#[async_trait]
impl NodeStore for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(&self, mut node: TreeNode) -> ServiceTreeResult<TreeNode> {
        let conn = self.get_connection()?;
        let tags = serde_json::to_string(&node.tags)?;

        conn.execute(
            "INSERT INTO nodes
                (uid, name, parent_id, level, path, tenant_id, owner, team, description,
                 tags, sort_order, status, create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                node.uid(),
                node.name,
                node.parent_id,
                node.level,
                node.path,
                node.tenant_id.as_str(),
                node.owner,
                node.team,
                node.description,
                tags,
                node.order,
                node.status.code(),
                format_time(&node.create_time),
                format_time(&node.update_time),
            ],
        )?;

        node.id = conn.last_insert_rowid();
        Ok(node)
    }

    async fn update(&self, node: &TreeNode) -> ServiceTreeResult<()> {
        let conn = self.get_connection()?;
        let tags = serde_json::to_string(&node.tags)?;

        let changed = conn.execute(
            "UPDATE nodes SET
                uid = ?1, name = ?2, parent_id = ?3, level = ?4, path = ?5, tenant_id = ?6,
                owner = ?7, team = ?8, description = ?9, tags = ?10, sort_order = ?11,
                status = ?12, update_time = ?13
             WHERE id = ?14",
            params![
                node.uid(),
                node.name,
                node.parent_id,
                node.level,
                node.path,
                node.tenant_id.as_str(),
                node.owner,
                node.team,
                node.description,
                tags,
                node.order,
                node.status.code(),
                format_time(&node.update_time),
                node.id,
            ],
        )?;

        if changed == 0 {
            return Err(NodeError::NotFound { id: node.id }.into());
        }
        Ok(())
    }

    async fn update_path(&self, id: i64, path: &str) -> ServiceTreeResult<()> {
        let conn = self.get_connection()?;
        let changed = conn.execute("UPDATE nodes SET path = ?1 WHERE id = ?2", params![path, id])?;
        if changed == 0 {
            return Err(NodeError::NotFound { id }.into());
        }
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<TreeNode>> {
        let conn = self.get_connection()?;
        query_optional(conn.query_row(
            &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
            [id],
            node_from_row,
        ))
    }

    async fn get_by_uid(
        &self,
        tenant_id: &TenantId,
        uid: &str,
    ) -> ServiceTreeResult<Option<TreeNode>> {
        let conn = self.get_connection()?;
        query_optional(conn.query_row(
            &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE tenant_id = ?1 AND uid = ?2"),
            params![tenant_id.as_str(), uid],
            node_from_row,
        ))
    }

    async fn list(&self, filter: &NodeFilter) -> ServiceTreeResult<Vec<TreeNode>> {
        let conn = self.get_connection()?;
        let mut clause = node_where(filter);
        let where_sql = clause.sql();
        let page_sql = clause.page(filter.offset, filter.limit);
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM nodes{where_sql} ORDER BY sort_order, create_time, id{page_sql}"
        );
        query_list(&conn, &sql, &clause.params, node_from_row)
    }

    async fn list_by_path(
        &self,
        tenant_id: &TenantId,
        path_prefix: &str,
    ) -> ServiceTreeResult<Vec<TreeNode>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes
             WHERE tenant_id = ?1 AND substr(path, 1, length(?2)) = ?2
             ORDER BY level, sort_order, id"
        ))?;
        let rows = stmt.query_map(params![tenant_id.as_str(), path_prefix], node_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn count(&self, filter: &NodeFilter) -> ServiceTreeResult<u64> {
        let conn = self.get_connection()?;
        let clause = node_where(filter);
        query_count(
            &conn,
            &format!("SELECT COUNT(*) FROM nodes{}", clause.sql()),
            &clause.params,
        )
    }

    async fn count_children(&self, parent_id: i64) -> ServiceTreeResult<u64> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE parent_id = ?1",
            [parent_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        let conn = self.get_connection()?;
        conn.execute("DELETE FROM nodes WHERE id = ?1", [id])?;
        Ok(())
    }
}

#[async_trait]
impl BindingStore for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(&self, mut binding: ResourceBinding) -> ServiceTreeResult<ResourceBinding> {
        let conn = self.get_connection()?;
        binding.id = insert_binding(&conn, &binding)?;
        Ok(binding)
    }

    async fn create_batch(&self, bindings: Vec<ResourceBinding>) -> ServiceTreeResult<u64> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        for binding in &bindings {
            insert_binding(&tx, binding)?;
        }
        tx.commit()?;
        Ok(bindings.len() as u64)
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<ResourceBinding>> {
        let conn = self.get_connection()?;
        query_optional(conn.query_row(
            &format!("SELECT {BINDING_COLUMNS} FROM bindings WHERE id = ?1"),
            [id],
            binding_from_row,
        ))
    }

    async fn get_by_resource(
        &self,
        tenant_id: &TenantId,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> ServiceTreeResult<Option<ResourceBinding>> {
        let conn = self.get_connection()?;
        query_optional(conn.query_row(
            &format!(
                "SELECT {BINDING_COLUMNS} FROM bindings
                 WHERE tenant_id = ?1 AND resource_type = ?2 AND resource_id = ?3"
            ),
            params![tenant_id.as_str(), resource_type.as_str(), resource_id],
            binding_from_row,
        ))
    }

    async fn list(&self, filter: &BindingFilter) -> ServiceTreeResult<Vec<ResourceBinding>> {
        let conn = self.get_connection()?;
        let mut clause = binding_where(filter);
        let where_sql = clause.sql();
        let page_sql = clause.page(filter.offset, filter.limit);
        let sql = format!(
            "SELECT {BINDING_COLUMNS} FROM bindings{where_sql} ORDER BY id DESC{page_sql}"
        );
        query_list(&conn, &sql, &clause.params, binding_from_row)
    }

    async fn count(&self, filter: &BindingFilter) -> ServiceTreeResult<u64> {
        let conn = self.get_connection()?;
        let clause = binding_where(filter);
        query_count(
            &conn,
            &format!("SELECT COUNT(*) FROM bindings{}", clause.sql()),
            &clause.params,
        )
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        let conn = self.get_connection()?;
        conn.execute("DELETE FROM bindings WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn delete_by_node(&self, node_id: i64) -> ServiceTreeResult<u64> {
        let conn = self.get_connection()?;
        let removed = conn.execute("DELETE FROM bindings WHERE node_id = ?1", [node_id])?;
        Ok(removed as u64)
    }

    async fn delete_by_rule(&self, rule_id: i64) -> ServiceTreeResult<u64> {
        let conn = self.get_connection()?;
        let removed = conn.execute("DELETE FROM bindings WHERE rule_id = ?1", [rule_id])?;
        Ok(removed as u64)
    }
}

#[async_trait]
impl RuleStore for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(&self, mut rule: BindingRule) -> ServiceTreeResult<BindingRule> {
        let conn = self.get_connection()?;
        let conditions = serde_json::to_string(&rule.conditions)?;

        conn.execute(
            "INSERT INTO rules
                (node_id, env_id, name, tenant_id, priority, conditions, enabled, description,
                 create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                rule.node_id,
                rule.env_id,
                rule.name,
                rule.tenant_id.as_str(),
                rule.priority,
                conditions,
                rule.enabled,
                rule.description,
                format_time(&rule.create_time),
                format_time(&rule.update_time),
            ],
        )?;

        rule.id = conn.last_insert_rowid();
        Ok(rule)
    }

    async fn update(&self, rule: &BindingRule) -> ServiceTreeResult<()> {
        let conn = self.get_connection()?;
        let conditions = serde_json::to_string(&rule.conditions)?;

        let changed = conn.execute(
            "UPDATE rules SET
                node_id = ?1, env_id = ?2, name = ?3, tenant_id = ?4, priority = ?5,
                conditions = ?6, enabled = ?7, description = ?8, update_time = ?9
             WHERE id = ?10",
            params![
                rule.node_id,
                rule.env_id,
                rule.name,
                rule.tenant_id.as_str(),
                rule.priority,
                conditions,
                rule.enabled,
                rule.description,
                format_time(&rule.update_time),
                rule.id,
            ],
        )?;

        if changed == 0 {
            return Err(RuleError::NotFound { id: rule.id }.into());
        }
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<BindingRule>> {
        let conn = self.get_connection()?;
        query_optional(conn.query_row(
            &format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?1"),
            [id],
            rule_from_row,
        ))
    }

    async fn list(&self, filter: &RuleFilter) -> ServiceTreeResult<Vec<BindingRule>> {
        let conn = self.get_connection()?;
        let mut clause = rule_where(filter);
        let where_sql = clause.sql();
        let page_sql = clause.page(filter.offset, filter.limit);
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM rules{where_sql} ORDER BY priority, id{page_sql}"
        );
        query_list(&conn, &sql, &clause.params, rule_from_row)
    }

    async fn list_enabled(&self, tenant_id: &TenantId) -> ServiceTreeResult<Vec<BindingRule>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM rules
             WHERE tenant_id = ?1 AND enabled = 1
             ORDER BY priority, id"
        ))?;
        let rows = stmt.query_map([tenant_id.as_str()], rule_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn count(&self, filter: &RuleFilter) -> ServiceTreeResult<u64> {
        let conn = self.get_connection()?;
        let clause = rule_where(filter);
        query_count(
            &conn,
            &format!("SELECT COUNT(*) FROM rules{}", clause.sql()),
            &clause.params,
        )
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        let conn = self.get_connection()?;
        conn.execute("DELETE FROM rules WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn delete_by_node(&self, node_id: i64) -> ServiceTreeResult<u64> {
        let conn = self.get_connection()?;
        let removed = conn.execute("DELETE FROM rules WHERE node_id = ?1", [node_id])?;
        Ok(removed as u64)
    }
}

#[async_trait]
impl EnvironmentStore for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(&self, mut env: Environment) -> ServiceTreeResult<Environment> {
        let conn = self.get_connection()?;
        env.id = insert_environment(&conn, &env)?;
        Ok(env)
    }

    async fn create_batch(&self, envs: Vec<Environment>) -> ServiceTreeResult<u64> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        for env in &envs {
            insert_environment(&tx, env)?;
        }
        tx.commit()?;
        Ok(envs.len() as u64)
    }

    async fn update(&self, env: &Environment) -> ServiceTreeResult<()> {
        let conn = self.get_connection()?;
        let changed = conn.execute(
            "UPDATE environments SET
                code = ?1, name = ?2, tenant_id = ?3, description = ?4, color = ?5,
                sort_order = ?6, status = ?7, update_time = ?8
             WHERE id = ?9",
            params![
                env.code,
                env.name,
                env.tenant_id.as_str(),
                env.description,
                env.color,
                env.order,
                env.status.code(),
                format_time(&env.update_time),
                env.id,
            ],
        )?;

        if changed == 0 {
            return Err(EnvironmentError::NotFound { id: env.id }.into());
        }
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<Environment>> {
        let conn = self.get_connection()?;
        query_optional(conn.query_row(
            &format!("SELECT {ENVIRONMENT_COLUMNS} FROM environments WHERE id = ?1"),
            [id],
            environment_from_row,
        ))
    }

    async fn get_by_code(
        &self,
        tenant_id: &TenantId,
        code: &str,
    ) -> ServiceTreeResult<Option<Environment>> {
        let conn = self.get_connection()?;
        query_optional(conn.query_row(
            &format!(
                "SELECT {ENVIRONMENT_COLUMNS} FROM environments WHERE tenant_id = ?1 AND code = ?2"
            ),
            params![tenant_id.as_str(), code],
            environment_from_row,
        ))
    }

    async fn list(&self, filter: &EnvironmentFilter) -> ServiceTreeResult<Vec<Environment>> {
        let conn = self.get_connection()?;
        let mut clause = environment_where(filter);
        let where_sql = clause.sql();
        let page_sql = clause.page(filter.offset, filter.limit);
        let sql = format!(
            "SELECT {ENVIRONMENT_COLUMNS} FROM environments{where_sql} ORDER BY sort_order, id{page_sql}"
        );
        query_list(&conn, &sql, &clause.params, environment_from_row)
    }

    async fn count(&self, filter: &EnvironmentFilter) -> ServiceTreeResult<u64> {
        let conn = self.get_connection()?;
        let clause = environment_where(filter);
        query_count(
            &conn,
            &format!("SELECT COUNT(*) FROM environments{}", clause.sql()),
            &clause.params,
        )
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        let conn = self.get_connection()?;
        conn.execute("DELETE FROM environments WHERE id = ?1", [id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BindType, Operator, RuleCondition};

    fn backend() -> SqliteBackend {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema().unwrap();
        backend
    }

    #[tokio::test]
    async fn test_node_roundtrip() {
        let backend = backend();
        let mut draft = TreeNode::new("t1", "payments")
            .with_uid("biz.payments")
            .with_owner("alice", "core");
        draft.tags = vec!["pci".to_string()];
        draft.level = 1;

        let created = NodeStore::create(&backend, draft).await.unwrap();
        assert_eq!(created.id, 1);
        backend.update_path(created.id, "/1/").await.unwrap();

        let read = NodeStore::get_by_id(&backend, 1).await.unwrap().unwrap();
        assert_eq!(read.path, "/1/");
        assert_eq!(read.uid(), Some("biz.payments"));
        assert_eq!(read.tags, vec!["pci".to_string()]);
        assert_eq!(read.owner, "alice");
        assert_eq!(read.create_time.timestamp(), created.create_time.timestamp());

        let by_uid = backend
            .get_by_uid(&TenantId::new("t1"), "biz.payments")
            .await
            .unwrap();
        assert_eq!(by_uid.map(|n| n.id), Some(1));
        assert!(NodeStore::get_by_id(&backend, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_node_uid_unique_but_nullable() {
        let backend = backend();
        NodeStore::create(&backend, TreeNode::new("t1", "a").with_uid("x"))
            .await
            .unwrap();
        let err = NodeStore::create(&backend, TreeNode::new("t1", "b").with_uid("x"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // nodes without uid never collide, empty uids are stored as NULL
        NodeStore::create(&backend, TreeNode::new("t1", "c")).await.unwrap();
        NodeStore::create(&backend, TreeNode::new("t1", "d").with_uid(""))
            .await
            .unwrap();
        NodeStore::create(&backend, TreeNode::new("t1", "e").with_uid(""))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_by_path_prefix() {
        let backend = backend();
        for (name, path, level) in [("a", "/1/", 1), ("b", "/1/2/", 2), ("c", "/12/", 1)] {
            let mut node = TreeNode::new("t1", name);
            node.level = level;
            node.path = path.to_string();
            NodeStore::create(&backend, node).await.unwrap();
        }

        let subtree = backend
            .list_by_path(&TenantId::new("t1"), "/1/")
            .await
            .unwrap();
        let names: Vec<&str> = subtree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        assert!(
            backend
                .list_by_path(&TenantId::new("t2"), "/1/")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_node_filter_and_pagination() {
        let backend = backend();
        for (name, order) in [("Order API", 2), ("order worker", 1), ("billing", 0)] {
            NodeStore::create(&backend, TreeNode::new("t1", name).with_order(order))
                .await
                .unwrap();
        }

        let filter = NodeFilter {
            name: Some("ORDER".to_string()),
            ..NodeFilter::for_tenant("t1")
        };
        let nodes = NodeStore::list(&backend, &filter).await.unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["order worker", "Order API"]);
        assert_eq!(NodeStore::count(&backend, &filter).await.unwrap(), 2);

        let page = NodeStore::list(&backend, &NodeFilter::for_tenant("t1").with_page(1, 1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "order worker");
    }

    #[tokio::test]
    async fn test_binding_roundtrip_and_uniqueness() {
        let backend = backend();
        let tenant = TenantId::new("t1");
        let created = BindingStore::create(
            &backend,
            ResourceBinding::from_rule(tenant.clone(), 3, 1, ResourceType::Instance, 7, 9),
        )
        .await
        .unwrap();

        let read = backend
            .get_by_resource(&tenant, ResourceType::Instance, 7)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.id, created.id);
        assert_eq!(read.bind_type, BindType::Rule);
        assert_eq!(read.rule_id, Some(9));

        let dup = BindingStore::create(
            &backend,
            ResourceBinding::manual(tenant.clone(), 4, 1, ResourceType::Instance, 7),
        )
        .await
        .unwrap_err();
        assert!(dup.is_conflict());
    }

    #[tokio::test]
    async fn test_binding_batch_rolls_back() {
        let backend = backend();
        let tenant = TenantId::new("t1");
        let batch = vec![
            ResourceBinding::manual(tenant.clone(), 1, 1, ResourceType::Instance, 1),
            ResourceBinding::manual(tenant.clone(), 1, 1, ResourceType::Instance, 1),
        ];
        assert!(
            BindingStore::create_batch(&backend, batch)
                .await
                .unwrap_err()
                .is_conflict()
        );
        assert_eq!(
            BindingStore::count(&backend, &BindingFilter::for_tenant("t1"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_rule_conditions_roundtrip() {
        let backend = backend();
        let rule = BindingRule::new("t1", "east", 1, 2)
            .with_priority(5)
            .with_condition(RuleCondition::new(
                "attributes.region",
                Operator::In,
                "us-east-1, us-east-2",
            ));
        let created = RuleStore::create(&backend, rule).await.unwrap();
        RuleStore::create(
            &backend,
            BindingRule::new("t1", "disabled", 1, 2).with_enabled(false),
        )
        .await
        .unwrap();

        let enabled = backend.list_enabled(&TenantId::new("t1")).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, created.id);
        assert_eq!(enabled[0].conditions[0].operator, Operator::In);

        assert_eq!(RuleStore::delete_by_node(&backend, 1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_environment_roundtrip() {
        let backend = backend();
        let envs = crate::types::default_environments(&TenantId::new("t1"));
        assert_eq!(EnvironmentStore::create_batch(&backend, envs).await.unwrap(), 4);

        let prod = backend
            .get_by_code(&TenantId::new("t1"), "prod")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prod.color, "#f5222d");
        assert_eq!(prod.order, 4);

        let listed = EnvironmentStore::list(&backend, &EnvironmentFilter::for_tenant("t1"))
            .await
            .unwrap();
        let codes: Vec<&str> = listed.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["dev", "test", "staging", "prod"]);

        let dup = EnvironmentStore::create(&backend, Environment::new("t1", "dev", "Dev"))
            .await
            .unwrap_err();
        assert!(dup.is_conflict());
    }
}
