use tracing::info;

use crate::db::{Database, Value};
use crate::error::EntregasError;
use crate::params;
use crate::types::delivery::{
    Commune, DEFAULT_STATUS, Delivery, DeliveryFilter, DeliveryPatch, NewDelivery, SortOrder,
};
use crate::validators::{not_blank, sanitize, validate_email, validate_phone};

const NOT_FOUND: &str = "Entrega no encontrada";

const SELECT_BY_ID: &str = "SELECT * FROM entregas WHERE id = ?";

const INSERT: &str = "INSERT INTO entregas \
     (cliente, direccion, comuna, region, telefono, email, producto, observaciones, estado) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

const UPDATE: &str = "UPDATE entregas SET \
     cliente = COALESCE(?, cliente), \
     direccion = COALESCE(?, direccion), \
     comuna = COALESCE(?, comuna), \
     region = COALESCE(?, region), \
     telefono = COALESCE(?, telefono), \
     email = COALESCE(?, email), \
     producto = COALESCE(?, producto), \
     observaciones = COALESCE(?, observaciones), \
     estado = COALESCE(?, estado), \
     fecha_actualizacion = NOW() \
     WHERE id = ?";

const COMMUNES: &str = "SELECT c.id, c.nombre, r.nombre AS region_nombre \
     FROM comunas c JOIN regiones r ON c.region_id = r.id \
     ORDER BY c.nombre ASC";

/// Delivery records over the database shim.
#[derive(Clone)]
pub struct DeliveryService {
    db: Database,
}

impl DeliveryService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub async fn list(&self, filter: &DeliveryFilter) -> Result<Vec<Delivery>, EntregasError> {
        let (sql, params) = build_list_query(filter);
        let rows = self.db.fetch(&sql, params).await?;
        rows.iter().map(Delivery::try_from).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Delivery, EntregasError> {
        let rows = self.db.fetch(SELECT_BY_ID, params![id]).await?;
        rows.first()
            .map(Delivery::try_from)
            .ok_or(EntregasError::NotFound(NOT_FOUND))?
    }

    /// Insert and read back the new row in one transaction.
    pub async fn create(&self, input: NewDelivery) -> Result<Delivery, EntregasError> {
        let input = clean_new(input)?;

        let mut tx = self.db.transaction().await?;
        let inserted = tx
            .query(
                INSERT,
                params![
                    input.cliente,
                    input.direccion,
                    input.comuna,
                    input.region,
                    input.telefono,
                    input.email,
                    input.producto,
                    input.observaciones,
                    input.estado,
                ],
            )
            .await?;
        let id = inserted.insert_id.ok_or(EntregasError::MissingInsertId)?;

        let created = tx.query(SELECT_BY_ID, params![id]).await?;
        let delivery = created
            .first()
            .map(Delivery::try_from)
            .ok_or(EntregasError::MissingInsertId)??;
        tx.commit().await?;

        info!(id = delivery.id, comuna = %delivery.comuna, "delivery created");
        Ok(delivery)
    }

    /// Partial update; absent fields keep their value and the update time is stamped.
    pub async fn update(&self, id: i64, patch: DeliveryPatch) -> Result<Delivery, EntregasError> {
        let patch = clean_patch(patch)?;

        let mut tx = self.db.transaction().await?;
        let existing = tx
            .query("SELECT id FROM entregas WHERE id = ?", params![id])
            .await?;
        if existing.rows.is_empty() {
            tx.rollback().await?;
            return Err(EntregasError::NotFound(NOT_FOUND));
        }

        tx.query(
            UPDATE,
            params![
                patch.cliente,
                patch.direccion,
                patch.comuna,
                patch.region,
                patch.telefono,
                patch.email,
                patch.producto,
                patch.observaciones,
                patch.estado,
                id,
            ],
        )
        .await?;

        let updated = tx.query(SELECT_BY_ID, params![id]).await?;
        let delivery = updated
            .first()
            .map(Delivery::try_from)
            .ok_or(EntregasError::NotFound(NOT_FOUND))??;
        tx.commit().await?;

        info!(id, "delivery updated");
        Ok(delivery)
    }

    pub async fn delete(&self, id: i64) -> Result<(), EntregasError> {
        let done = self
            .db
            .query("DELETE FROM entregas WHERE id = ?", params![id])
            .await?;
        if done.affected_rows == 0 {
            return Err(EntregasError::NotFound(NOT_FOUND));
        }
        info!(id, "delivery deleted");
        Ok(())
    }

    pub async fn communes(&self) -> Result<Vec<Commune>, EntregasError> {
        let rows = self.db.fetch(COMMUNES, Vec::new()).await?;
        rows.iter().map(Commune::try_from).collect()
    }
}

/// Build the filtered listing. Only `?` placeholders carry user input; the
/// sort column comes from a fixed whitelist.
pub fn build_list_query(filter: &DeliveryFilter) -> (String, Vec<Value>) {
    let mut sql = String::from("SELECT * FROM entregas WHERE 1=1");
    let mut params: Vec<Value> = Vec::new();

    let present = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(region) = present(&filter.region) {
        sql.push_str(" AND region = ?");
        params.push(region.into());
    }
    if let Some(comuna) = present(&filter.comuna) {
        sql.push_str(" AND comuna = ?");
        params.push(comuna.into());
    }
    if let Some(estado) = present(&filter.estado) {
        sql.push_str(" AND estado = ?");
        params.push(estado.into());
    }
    if let Some(cliente) = present(&filter.cliente) {
        sql.push_str(" AND cliente LIKE ?");
        params.push(format!("%{cliente}%").into());
    }
    if let Some(desde) = filter.fecha_desde {
        sql.push_str(" AND CAST(fecha_creacion AS DATE) >= ?");
        params.push(desde.into());
    }
    if let Some(hasta) = filter.fecha_hasta {
        sql.push_str(" AND CAST(fecha_creacion AS DATE) <= ?");
        params.push(hasta.into());
    }
    if let Some(search) = present(&filter.search) {
        let pattern = format!("%{search}%");
        sql.push_str(" AND (cliente LIKE ? OR direccion LIKE ? OR producto LIKE ?)");
        params.extend(std::iter::repeat_n(Value::from(pattern), 3));
    }

    match filter.sort {
        Some(field) => {
            let order = filter.order.unwrap_or_default().keyword();
            sql.push_str(&format!(" ORDER BY {} {order}, id {order}", field.column()));
        }
        None => {
            let order = filter.order.unwrap_or(SortOrder::Desc).keyword();
            sql.push_str(&format!(" ORDER BY fecha_creacion {order}"));
        }
    }

    (sql, params)
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| sanitize(&v)).filter(|v| !v.is_empty())
}

fn check_contact(telefono: Option<&str>, email: Option<&str>) -> Result<(), EntregasError> {
    if let Some(email) = email
        && !validate_email(email)
    {
        return Err(EntregasError::Validation("Email inválido".into()));
    }
    if let Some(telefono) = telefono
        && !validate_phone(telefono)
    {
        return Err(EntregasError::Validation("Teléfono inválido".into()));
    }
    Ok(())
}

struct CleanDelivery {
    cliente: String,
    direccion: String,
    comuna: String,
    region: String,
    telefono: Option<String>,
    email: Option<String>,
    producto: Option<String>,
    observaciones: Option<String>,
    estado: String,
}

fn clean_new(input: NewDelivery) -> Result<CleanDelivery, EntregasError> {
    let required = [&input.cliente, &input.direccion, &input.comuna, &input.region];
    if !required.iter().all(|v| not_blank(v.as_deref())) {
        return Err(EntregasError::Validation(
            "Cliente, dirección, comuna y región son requeridos".into(),
        ));
    }

    let telefono = clean_optional(input.telefono);
    let email = clean_optional(input.email);
    check_contact(telefono.as_deref(), email.as_deref())?;

    Ok(CleanDelivery {
        cliente: sanitize(input.cliente.as_deref().unwrap_or_default()),
        direccion: sanitize(input.direccion.as_deref().unwrap_or_default()),
        comuna: sanitize(input.comuna.as_deref().unwrap_or_default()),
        region: sanitize(input.region.as_deref().unwrap_or_default()),
        telefono,
        email,
        producto: clean_optional(input.producto),
        observaciones: clean_optional(input.observaciones),
        estado: clean_optional(input.estado).unwrap_or_else(|| DEFAULT_STATUS.to_string()),
    })
}

fn clean_patch(patch: DeliveryPatch) -> Result<DeliveryPatch, EntregasError> {
    let patch = DeliveryPatch {
        cliente: clean_optional(patch.cliente),
        direccion: clean_optional(patch.direccion),
        comuna: clean_optional(patch.comuna),
        region: clean_optional(patch.region),
        telefono: clean_optional(patch.telefono),
        email: clean_optional(patch.email),
        producto: clean_optional(patch.producto),
        observaciones: clean_optional(patch.observaciones),
        estado: clean_optional(patch.estado),
    };
    check_contact(patch.telefono.as_deref(), patch.email.as_deref())?;
    Ok(patch)
}
