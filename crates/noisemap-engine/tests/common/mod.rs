#![allow(dead_code)]

use rusqlite::Connection;

use noisemap_core::{
    AttenuationRecord, BandLevels, EmissionRecord, Point, Receiver, SourceIdentity,
};
use noisemap_engine::MemoryStore;

pub const LEVEL_TOLERANCE: f64 = 1e-6;

pub fn close(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

pub fn attenuation(receiver_id: i64, source_id: i64, level: f64) -> AttenuationRecord {
    AttenuationRecord {
        receiver_id,
        source_id,
        attenuation: BandLevels::splat(level),
    }
}

pub fn identity(id: i64, link_key: &str) -> SourceIdentity {
    SourceIdentity {
        id,
        link_key: link_key.to_string(),
    }
}

pub fn emission(link_key: &str, time_bin: i64, level: f64) -> EmissionRecord {
    EmissionRecord {
        link_key: link_key.to_string(),
        time_bin,
        emission: BandLevels::splat(level),
    }
}

/// Receiver 1 hears source 10 through 40 dB of loss; source 10 emits 80 dB
/// at midnight. Receiver 2 has no attenuation records at all.
pub fn single_source_store() -> MemoryStore {
    MemoryStore::new()
        .with_receivers(vec![
            Receiver::new(1, Point::new(100.0, 200.0)),
            Receiver::new(2, Point::with_z(150.0, 250.0, 4.0)),
        ])
        .with_attenuation(vec![attenuation(1, 10, -40.0)])
        .with_source_identities(vec![identity(10, "road-a")])
        .with_emissions(vec![emission("road-a", 0, 80.0)])
}

/// Several receivers and sources with emissions spread over the day.
pub fn network_store(receivers: i64) -> MemoryStore {
    let sources = 12;
    let mut att = Vec::new();
    for r in 0..receivers {
        for s in 0..sources {
            if (r + s) % 3 != 0 {
                att.push(attenuation(r, s, -20.0 - ((r * 7 + s * 13) % 50) as f64));
            }
        }
    }
    let identities = (0..sources)
        .map(|s| identity(s, &format!("link-{}", s % 8)))
        .collect();
    let mut em = Vec::new();
    for link in 0..8 {
        for hour in (0..24).filter(|h| (h + link) % 4 != 0) {
            em.push(emission(
                &format!("link-{}", link),
                hour * 3600,
                70.0 + ((hour * 5 + link * 3) % 20) as f64,
            ));
        }
    }
    MemoryStore::new()
        .with_receivers(
            (0..receivers)
                .map(|r| Receiver::new(r, Point::new(r as f64 * 10.0, 0.0)))
                .collect(),
        )
        .with_attenuation(att)
        .with_source_identities(identities)
        .with_emissions(em)
}

/// Create the default input tables and fill them from `store`.
pub fn seed_sqlite(conn: &Connection, store: &MemoryStore) {
    conn.execute_batch(
        "CREATE TABLE RECEIVERS (id INTEGER PRIMARY KEY, geometry TEXT);
         CREATE TABLE ATTENUATION (receiver_id INTEGER, source_id INTEGER,
             hz63 REAL, hz125 REAL, hz250 REAL, hz500 REAL,
             hz1000 REAL, hz2000 REAL, hz4000 REAL, hz8000 REAL);
         CREATE TABLE SOURCES (id INTEGER, link_key TEXT);
         CREATE TABLE SOURCES_LW (link_key TEXT, time_bin INTEGER,
             lw63 REAL, lw125 REAL, lw250 REAL, lw500 REAL,
             lw1000 REAL, lw2000 REAL, lw4000 REAL, lw8000 REAL);",
    )
    .unwrap();

    for r in &store.receivers {
        conn.execute(
            "INSERT INTO RECEIVERS VALUES (?1, ?2)",
            rusqlite::params![r.id, r.geometry.to_wkt()],
        )
        .unwrap();
    }
    for a in &store.attenuation {
        let l = a.attenuation.as_array();
        conn.execute(
            "INSERT INTO ATTENUATION VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![a.receiver_id, a.source_id, l[0], l[1], l[2], l[3], l[4], l[5], l[6], l[7]],
        )
        .unwrap();
    }
    for s in &store.source_identities {
        conn.execute(
            "INSERT INTO SOURCES VALUES (?1, ?2)",
            rusqlite::params![s.id, s.link_key],
        )
        .unwrap();
    }
    for e in &store.emissions {
        let l = e.emission.as_array();
        conn.execute(
            "INSERT INTO SOURCES_LW VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![e.link_key, e.time_bin, l[0], l[1], l[2], l[3], l[4], l[5], l[6], l[7]],
        )
        .unwrap();
    }
}
