//! DDL for the delivery tables, one script per engine.

use super::dialect::Engine;

/// MySQL schema:
/// - `regiones` / `comunas` lookup tables, communes point at their region
/// - `entregas` with an AUTO_INCREMENT `id` and creation/update timestamps
pub const MYSQL_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS regiones (
    id INT AUTO_INCREMENT PRIMARY KEY,
    nombre VARCHAR(100) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS comunas (
    id INT AUTO_INCREMENT PRIMARY KEY,
    nombre VARCHAR(100) NOT NULL,
    region_id INT NOT NULL,
    FOREIGN KEY (region_id) REFERENCES regiones(id)
);

CREATE TABLE IF NOT EXISTS entregas (
    id INT AUTO_INCREMENT PRIMARY KEY,
    cliente VARCHAR(150) NOT NULL,
    direccion VARCHAR(255) NOT NULL,
    comuna VARCHAR(100) NOT NULL,
    region VARCHAR(100) NOT NULL,
    telefono VARCHAR(20) NULL,
    email VARCHAR(150) NULL,
    producto VARCHAR(255) NULL,
    observaciones TEXT NULL,
    estado VARCHAR(30) NOT NULL DEFAULT 'proceso',
    fecha_creacion DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    fecha_actualizacion DATETIME NULL,
    INDEX idx_entregas_estado (estado),
    INDEX idx_entregas_fecha (fecha_creacion)
);
"#;

/// SQL Server schema; same tables with IDENTITY columns, guarded by `OBJECT_ID`.
pub const MSSQL_INIT: &str = r#"
IF OBJECT_ID(N'regiones', N'U') IS NULL
CREATE TABLE regiones (
    id INT IDENTITY(1,1) PRIMARY KEY,
    nombre NVARCHAR(100) NOT NULL UNIQUE
);

IF OBJECT_ID(N'comunas', N'U') IS NULL
CREATE TABLE comunas (
    id INT IDENTITY(1,1) PRIMARY KEY,
    nombre NVARCHAR(100) NOT NULL,
    region_id INT NOT NULL REFERENCES regiones(id)
);

IF OBJECT_ID(N'entregas', N'U') IS NULL
CREATE TABLE entregas (
    id INT IDENTITY(1,1) PRIMARY KEY,
    cliente NVARCHAR(150) NOT NULL,
    direccion NVARCHAR(255) NOT NULL,
    comuna NVARCHAR(100) NOT NULL,
    region NVARCHAR(100) NOT NULL,
    telefono NVARCHAR(20) NULL,
    email NVARCHAR(150) NULL,
    producto NVARCHAR(255) NULL,
    observaciones NVARCHAR(MAX) NULL,
    estado NVARCHAR(30) NOT NULL DEFAULT 'proceso',
    fecha_creacion DATETIME2 NOT NULL DEFAULT SYSDATETIME(),
    fecha_actualizacion DATETIME2 NULL
);
"#;

pub fn init_script(engine: Engine) -> &'static str {
    match engine {
        Engine::MySql => MYSQL_INIT,
        Engine::MsSql => MSSQL_INIT,
    }
}
