//! Table definitions
//!
//! Timestamps are stored as UTC unix seconds.

pub(crate) const MIGRATIONS: [&str; 7] = [
    "CREATE TABLE IF NOT EXISTS historical_pollutants (
        timestamp INTEGER PRIMARY KEY,
        location TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        pm2_5 REAL,
        pm10 REAL,
        no2 REAL,
        so2 REAL,
        co REAL,
        o3 REAL,
        nh3 REAL,
        aqi INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS weather_observations (
        timestamp INTEGER PRIMARY KEY,
        location TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        temperature REAL,
        humidity REAL,
        pressure REAL,
        windspeed REAL,
        winddirection REAL,
        precipitation REAL
    )",
    "CREATE TABLE IF NOT EXISTS training_features (
        timestamp INTEGER PRIMARY KEY,
        label REAL,
        data TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS model_registry (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        version INTEGER NOT NULL,
        rank INTEGER NOT NULL,
        kind TEXT NOT NULL,
        target TEXT NOT NULL,
        horizon_hours INTEGER NOT NULL,
        features TEXT NOT NULL,
        params BLOB NOT NULL,
        rmse REAL NOT NULL,
        mae REAL NOT NULL,
        r2 REAL NOT NULL,
        cv_r2 REAL,
        trained_at INTEGER NOT NULL,
        UNIQUE (version, rank)
    )",
    "CREATE TABLE IF NOT EXISTS predictions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL,
        target TEXT NOT NULL,
        predicted_value REAL NOT NULL,
        predicted_aqi INTEGER NOT NULL,
        category TEXT NOT NULL,
        model_version INTEGER NOT NULL,
        model_kind TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_predictions_timestamp ON predictions (timestamp)",
    "CREATE TABLE IF NOT EXISTS current_weather (
        timestamp INTEGER NOT NULL,
        location TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        temperature REAL NOT NULL,
        humidity REAL NOT NULL,
        pressure REAL NOT NULL,
        windspeed REAL NOT NULL,
        winddirection REAL NOT NULL,
        precipitation REAL NOT NULL,
        fetched_at INTEGER NOT NULL
    )",
];
