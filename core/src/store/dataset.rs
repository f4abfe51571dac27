//! Store methods for persisted simulated datasets.

use crate::{cohort::Dataset, error::SimResult, missingness::Scenario, types::SimNo};
use rusqlite::params;

use super::ResultStore;

impl ResultStore {
    pub fn save_dataset(&self, run_id: &str, scenario: Scenario, dataset: &Dataset) -> SimResult<()> {
        let payload = serde_json::to_string(dataset)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO dataset (run_id, scenario, simno, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![run_id, scenario.code(), dataset.simno as i64, payload],
        )?;
        Ok(())
    }

    pub fn load_dataset(&self, run_id: &str, scenario: Scenario, simno: SimNo) -> SimResult<Option<Dataset>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM dataset WHERE run_id = ?1 AND scenario = ?2 AND simno = ?3",
        )?;
        let mut rows = stmt.query_map(params![run_id, scenario.code(), simno as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let payload = rows.next().transpose()?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}
