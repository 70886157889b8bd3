//! Dense nodal-analysis matrix and stamp operations.

/// Nodal system A·x = z with a dense row-major coefficient matrix.
///
/// One row per node of the owning network. Resized only when the node
/// count changes; cleared and re-stamped on every recompute.
#[derive(Debug)]
pub struct NodalMatrix {
    /// Coefficient matrix A (row-major).
    pub a: Vec<f64>,
    /// Right-hand side vector z.
    pub z: Vec<f64>,
    /// Matrix dimension.
    pub size: usize,
}

impl NodalMatrix {
    /// Create a new system of the given dimension.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            z: vec![0.0; size],
            size,
        }
    }

    /// Resize to a new dimension, reallocating only on an actual change.
    pub fn resize(&mut self, size: usize) {
        if size != self.size {
            self.a = vec![0.0; size * size];
            self.z = vec![0.0; size];
            self.size = size;
        }
    }

    /// Clear the matrix and right-hand side to zero.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
        self.z.fill(0.0);
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    /// Set matrix element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] = value;
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    /// Zero an entire row.
    pub fn zero_row(&mut self, row: usize) {
        let start = row * self.size;
        self.a[start..start + self.size].fill(0.0);
    }

    /// Stamp a conductance between a node and either another node or the
    /// implicit reference.
    ///
    /// For a conductance G between rows i and j:
    ///   A[i,i] += G, A[j,j] += G, A[i,j] -= G, A[j,i] -= G
    /// With only one real endpoint, just the diagonal entry is stamped.
    pub fn stamp_conductance(&mut self, i: usize, j: Option<usize>, g: f64) {
        self.add(i, i, g);
        if let Some(j) = j {
            self.add(j, j, g);
            self.add(i, j, -g);
            self.add(j, i, -g);
        }
    }

    /// Stamp a coupling node's constraint row.
    ///
    /// Overwrites (never adds): the coupling owns its row unconditionally,
    /// so it is zeroed first, then the relation
    /// `Σ(±ratio·V_primary) − Σ(±1·V_secondary) = 0` is written, with
    /// reciprocal entries in each terminal row's column enforcing current
    /// continuity through the virtual node. Signs alternate across
    /// multiple terminals within the same group.
    pub fn stamp_coupling(
        &mut self,
        row: usize,
        primaries: &[usize],
        secondaries: &[usize],
        ratio: f64,
    ) {
        self.zero_row(row);

        let mut sign = 1.0;
        for &p in primaries {
            self.set(row, p, sign * ratio);
            self.set(p, row, -sign * ratio);
            sign = -sign;
        }

        let mut sign = 1.0;
        for &s in secondaries {
            self.set(row, s, -sign);
            self.set(s, row, sign);
            sign = -sign;
        }
    }

    /// Fold a fixed-potential node into the system (Dirichlet elimination).
    ///
    /// For source row k with potential U: every other row i moves
    /// `-U·A[i,k]` into z[i] and zeroes A[i,k]; row k itself becomes
    /// diagonal-only with value -1 and z[k] = -U, so the row solves to
    /// `x[k] = U` without changing the system size.
    pub fn fold_source(&mut self, k: usize, u: f64) {
        for i in 0..self.size {
            if i == k {
                continue;
            }
            let coeff = self.get(i, k);
            if coeff != 0.0 {
                self.z[i] -= u * coeff;
                self.set(i, k, 0.0);
            }
        }
        self.zero_row(k);
        self.set(k, k, -1.0);
        self.z[k] = -u;
    }

    /// Dense matrix-vector product `out = A·x`.
    pub fn mul(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.size);
        debug_assert_eq!(out.len(), self.size);
        for (i, out_i) in out.iter_mut().enumerate() {
            let row = &self.a[i * self.size..(i + 1) * self.size];
            let mut acc = 0.0;
            for (a_ij, x_j) in row.iter().zip(x.iter()) {
                acc += a_ij * x_j;
            }
            *out_i = acc;
        }
    }
}
