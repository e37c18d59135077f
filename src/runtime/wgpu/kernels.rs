//! [`KernelOps`] for the WebGPU client
//!
//! Scalars are narrowed to `f32` at the launch boundary. Only `dot` (and
//! `norm`) block the host: they read one value back.

use super::client::WgpuClient;
use super::runtime::{WgpuRuntime, WgpuVector};
use super::shaders::{launch_axpy, launch_block_trsv_level, launch_bsr_spmv, launch_dot, launch_recombine};
use crate::error::{Error, Result};
use crate::runtime::KernelOps;
use crate::sparse::{DeviceBlockMatrix, TriangularSweep};

impl KernelOps<WgpuRuntime> for WgpuClient {
    fn dot(&self, a: &WgpuVector, b: &WgpuVector) -> Result<f64> {
        Error::check_len("dot operand", a.len, b.len)?;
        if a.len == 0 {
            return Ok(0.0);
        }
        let scratch = self.reduction.lock();
        launch_dot(&self.pipeline_cache, &a.buffer, &b.buffer, &scratch.partials, a.len);
        let mut out = [0.0f32];
        self.read_back(
            &scratch.partials,
            &scratch.staging,
            std::mem::size_of::<f32>() as u64,
            &mut out,
        )?;
        Ok(f64::from(out[0]))
    }

    fn axpy(&self, x: &WgpuVector, alpha: f64, y: &mut WgpuVector) -> Result<()> {
        Error::check_len("axpy operand", y.len, x.len)?;
        launch_axpy(&self.pipeline_cache, &x.buffer, alpha as f32, &y.buffer, y.len);
        Ok(())
    }

    fn recombine(
        &self,
        p: &mut WgpuVector,
        r: &WgpuVector,
        v: &WgpuVector,
        beta: f64,
        omega: f64,
    ) -> Result<()> {
        Error::check_len("recombine r", p.len, r.len)?;
        Error::check_len("recombine v", p.len, v.len)?;
        launch_recombine(
            &self.pipeline_cache,
            &p.buffer,
            &r.buffer,
            &v.buffer,
            beta as f32,
            omega as f32,
            p.len,
        );
        Ok(())
    }

    fn spmv(
        &self,
        a: &DeviceBlockMatrix<WgpuRuntime>,
        x: &WgpuVector,
        y: &mut WgpuVector,
    ) -> Result<()> {
        Error::check_len("spmv input", a.ncols * a.block_size, x.len)?;
        Error::check_len("spmv output", a.nrows * a.block_size, y.len)?;
        launch_bsr_spmv(
            &self.pipeline_cache,
            &a.row_ptrs.buffer,
            &a.col_indices.buffer,
            &a.values.buffer,
            &x.buffer,
            &y.buffer,
            a.nrows,
            a.block_size,
        );
        Ok(())
    }

    fn block_trsv_level(
        &self,
        lu: &DeviceBlockMatrix<WgpuRuntime>,
        sweep: &TriangularSweep<WgpuRuntime>,
        level: usize,
        lower: bool,
        x: &mut WgpuVector,
    ) -> Result<()> {
        let levels = if lower { &sweep.lower } else { &sweep.upper };
        if level + 1 >= levels.level_ptrs.len() {
            return Err(Error::invalid_dimension(
                "trsv level",
                format!("level {level} of {}", levels.num_levels()),
            ));
        }
        Error::check_len("trsv vector", lu.nrows * lu.block_size, x.len)?;
        launch_block_trsv_level(
            &self.pipeline_cache,
            &levels.rows.buffer,
            &lu.row_ptrs.buffer,
            &lu.col_indices.buffer,
            &sweep.diag_ptrs.buffer,
            &lu.values.buffer,
            &x.buffer,
            levels.level_ptrs[level],
            levels.level_len(level),
            lu.block_size,
            lower,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Runtime, RuntimeClient};
    use crate::sparse::BlockedMatrix;

    fn client() -> Option<WgpuClient> {
        WgpuRuntime::select_device(0, 0)
            .and_then(|d| WgpuRuntime::create_client(&d))
            .map_err(|e| println!("No GPU available, skipping test: {}", e))
            .ok()
    }

    #[test]
    fn test_dot_and_axpy() {
        let Some(client) = client() else { return };
        let n = 10_000;
        let a: Vec<f64> = (0..n).map(|i| (i % 7) as f64 * 0.5).collect();
        let b: Vec<f64> = (0..n).map(|i| (i % 3) as f64).collect();
        let expected: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();

        let da = client.upload_vector(&a, "a").unwrap();
        let mut db = client.upload_vector(&b, "b").unwrap();
        let dot = client.dot(&da, &db).unwrap();
        assert!((dot - expected).abs() < 1e-4 * expected);

        client.axpy(&da, 2.0, &mut db).unwrap();
        let mut out = vec![0.0; n];
        client.download_vector(&db, &mut out).unwrap();
        for i in 0..n {
            assert!((out[i] - (b[i] + 2.0 * a[i])).abs() < 1e-5);
        }
    }

    #[test]
    fn test_spmv_matches_host() {
        let Some(client) = client() else { return };
        let m = BlockedMatrix::from_blocks(
            2,
            2,
            vec![
                (0, 0, vec![4.0, 1.0, 0.0, 3.0]),
                (0, 1, vec![-1.0, 0.0, 0.5, -1.0]),
                (1, 1, vec![5.0, 0.0, 1.0, 2.0]),
            ],
        )
        .unwrap();
        let x = vec![1.0, 2.0, -1.0, 0.5];
        let mut expected = vec![0.0; 4];
        m.spmv(&x, &mut expected).unwrap();

        let dm = DeviceBlockMatrix::<WgpuRuntime>::upload(&client, &m, "m").unwrap();
        let dx = client.upload_vector(&x, "x").unwrap();
        let mut dy = client.alloc_vector(4, "y").unwrap();
        client.spmv(&dm, &dx, &mut dy).unwrap();
        let mut y = vec![0.0; 4];
        client.download_vector(&dy, &mut y).unwrap();
        for (a, b) in y.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
