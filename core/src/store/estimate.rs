//! Store methods for per-dataset estimate records.

use crate::{
    error::SimResult,
    estimate::{CompletionCode, Estimate, EstimateRecord},
};
use rusqlite::{params, Row};

use super::ResultStore;

fn nullable(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn read_estimate(row: &Row<'_>, first: usize) -> rusqlite::Result<Estimate> {
    let get = |i: usize| -> rusqlite::Result<f64> {
        Ok(row.get::<_, Option<f64>>(first + i)?.unwrap_or(f64::NAN))
    };
    Ok(Estimate {
        estimate: get(0)?,
        se:       get(1)?,
        lower:    get(2)?,
        upper:    get(3)?,
        df:       get(4)?,
    })
}

impl ResultStore {
    /// Append one estimate row. Rows are append-only.
    pub fn append_estimate(&self, run_id: &str, record: &EstimateRecord) -> SimResult<()> {
        let [r, m, d] = [&record.regression, &record.mean, &record.median];
        self.conn.execute(
            "INSERT INTO estimate (
                run_id, simno, code,
                regression_est, regression_se, regression_lo, regression_hi, regression_df,
                mean_est, mean_se, mean_lo, mean_hi, mean_df,
                median_est, median_se, median_lo, median_hi, median_df)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                run_id,
                record.simno as i64,
                record.code.code(),
                nullable(r.estimate), nullable(r.se), nullable(r.lower), nullable(r.upper), nullable(r.df),
                nullable(m.estimate), nullable(m.se), nullable(m.lower), nullable(m.upper), nullable(m.df),
                nullable(d.estimate), nullable(d.se), nullable(d.lower), nullable(d.upper), nullable(d.df),
            ],
        )?;
        Ok(())
    }

    /// All estimate rows of a run, in dataset order.
    pub fn estimates_for_run(&self, run_id: &str) -> SimResult<Vec<EstimateRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT simno, code,
                    regression_est, regression_se, regression_lo, regression_hi, regression_df,
                    mean_est, mean_se, mean_lo, mean_hi, mean_df,
                    median_est, median_se, median_lo, median_hi, median_df
             FROM estimate WHERE run_id = ?1
             ORDER BY simno ASC",
        )?;
        let records = stmt
            .query_map(params![run_id], |row| {
                let code: u8 = row.get(1)?;
                Ok(EstimateRecord {
                    simno: row.get::<_, i64>(0)? as u64,
                    code: CompletionCode::from_code(code).unwrap_or(CompletionCode::EstimationFailed),
                    regression: read_estimate(row, 2)?,
                    mean: read_estimate(row, 7)?,
                    median: read_estimate(row, 12)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ── Test / summary helpers ────────────────────────────────────────

    pub fn estimate_count(&self, run_id: &str) -> SimResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM estimate WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Rows of a run that carry a non-zero completion code.
    pub fn failure_count(&self, run_id: &str) -> SimResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM estimate WHERE run_id = ?1 AND code != 0",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
