use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::db::{Row, Value};
use crate::error::EntregasError;

/// Status assigned when a delivery is created without one.
pub const DEFAULT_STATUS: &str = "proceso";

/// One row of `entregas`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub id: i64,
    pub cliente: String,
    pub direccion: String,
    pub comuna: String,
    pub region: String,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub producto: Option<String>,
    pub observaciones: Option<String>,
    pub estado: String,
    pub fecha_creacion: Option<NaiveDateTime>,
    pub fecha_actualizacion: Option<NaiveDateTime>,
}

impl TryFrom<&Row> for Delivery {
    type Error = EntregasError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row
                .get("id")
                .and_then(Value::as_i64)
                .ok_or_else(|| EntregasError::RowShape("entregas.id".into()))?,
            cliente: required_text(row, "cliente")?,
            direccion: required_text(row, "direccion")?,
            comuna: required_text(row, "comuna")?,
            region: required_text(row, "region")?,
            telefono: optional_text(row, "telefono"),
            email: optional_text(row, "email"),
            producto: optional_text(row, "producto"),
            observaciones: optional_text(row, "observaciones"),
            estado: optional_text(row, "estado").unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            fecha_creacion: row.get("fecha_creacion").and_then(Value::as_datetime),
            fecha_actualizacion: row.get("fecha_actualizacion").and_then(Value::as_datetime),
        })
    }
}

fn required_text(row: &Row, col: &str) -> Result<String, EntregasError> {
    optional_text(row, col).ok_or_else(|| EntregasError::RowShape(format!("entregas.{col}")))
}

fn optional_text(row: &Row, col: &str) -> Option<String> {
    row.get(col).and_then(Value::as_str).map(str::to_string)
}

/// Body of `POST /api/deliveries`. Everything is optional here so missing
/// fields surface as validation messages rather than parse errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDelivery {
    pub cliente: Option<String>,
    pub direccion: Option<String>,
    pub comuna: Option<String>,
    pub region: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub producto: Option<String>,
    pub observaciones: Option<String>,
    pub estado: Option<String>,
}

/// Body of `PUT /api/deliveries/{id}`; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryPatch {
    pub cliente: Option<String>,
    pub direccion: Option<String>,
    pub comuna: Option<String>,
    pub region: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub producto: Option<String>,
    pub observaciones: Option<String>,
    pub estado: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    Cliente,
    Comuna,
    Region,
    Estado,
    FechaCreacion,
    FechaActualizacion,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Cliente => "cliente",
            SortField::Comuna => "comuna",
            SortField::Region => "region",
            SortField::Estado => "estado",
            SortField::FechaCreacion => "fecha_creacion",
            SortField::FechaActualizacion => "fecha_actualizacion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Query string of `GET /api/deliveries`. Blank values count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryFilter {
    pub region: Option<String>,
    pub comuna: Option<String>,
    pub estado: Option<String>,
    /// Substring match on the client name.
    pub cliente: Option<String>,
    pub fecha_desde: Option<NaiveDate>,
    pub fecha_hasta: Option<NaiveDate>,
    /// Free text over client, address and product.
    pub search: Option<String>,
    pub sort: Option<SortField>,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Commune {
    pub id: i64,
    pub nombre: String,
    pub region_nombre: String,
}

impl TryFrom<&Row> for Commune {
    type Error = EntregasError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        let text = |col: &str| {
            optional_text(row, col).ok_or_else(|| EntregasError::RowShape(format!("comunas.{col}")))
        };
        Ok(Self {
            id: row
                .get("id")
                .and_then(Value::as_i64)
                .ok_or_else(|| EntregasError::RowShape("comunas.id".into()))?,
            nombre: text("nombre")?,
            region_nombre: text("region_nombre")?,
        })
    }
}
