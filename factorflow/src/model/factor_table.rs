use crate::api::error::ModelError;

/// Joint weights of a discrete factor, stored row-major with the last
/// dimension varying fastest.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FactorTable {
    dims: Vec<usize>,
    weights: Vec<f64>,
}

impl FactorTable {
    pub fn new(dims: Vec<usize>, weights: Vec<f64>) -> Result<Self, ModelError> {
        let expected = dims.iter().product::<usize>();
        if dims.is_empty() || expected == 0 {
            return Err(ModelError::InvalidWeights(format!(
                "empty dimensions {:?}",
                dims
            )));
        }
        if expected != weights.len() {
            return Err(ModelError::TableSize {
                expected,
                actual: weights.len(),
            });
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0f64) {
            return Err(ModelError::InvalidWeights(format!(
                "weight {} is negative or not finite",
                w
            )));
        }

        Ok(FactorTable { dims, weights })
    }

    pub fn from_fn<F>(dims: Vec<usize>, f: F) -> Result<Self, ModelError>
    where
        F: Fn(&[usize]) -> f64,
    {
        let len = dims.iter().product::<usize>();
        let mut weights = Vec::with_capacity(len);
        let mut assignment = vec![0; dims.len()];
        for _ in 0..len {
            weights.push(f(assignment.as_slice()));
            advance(&dims, &mut assignment);
        }
        FactorTable::new(dims, weights)
    }

    /// Parity check over `arity` binary variables: weight 1 when the sum of
    /// the assignment is even.
    pub fn xor(arity: usize) -> Self {
        let dims = vec![2; arity.max(1)];
        let len = dims.iter().product::<usize>();
        let mut weights = Vec::with_capacity(len);
        let mut assignment = vec![0; dims.len()];
        for _ in 0..len {
            let sum: usize = assignment.iter().sum();
            weights.push(if sum % 2 == 0 { 1f64 } else { 0f64 });
            advance(&dims, &mut assignment);
        }
        FactorTable { dims, weights }
    }

    /// Weight 1 when all `arity` variables over `domain` values agree.
    pub fn equality(domain: usize, arity: usize) -> Self {
        let dims = vec![domain.max(1); arity.max(1)];
        let len = dims.iter().product::<usize>();
        let mut weights = Vec::with_capacity(len);
        let mut assignment = vec![0; dims.len()];
        for _ in 0..len {
            let first = assignment[0];
            let equal = assignment.iter().all(|x| *x == first);
            weights.push(if equal { 1f64 } else { 0f64 });
            advance(&dims, &mut assignment);
        }
        FactorTable { dims, weights }
    }

    pub fn dims(&self) -> &[usize] {
        self.dims.as_slice()
    }

    pub fn arity(&self) -> usize {
        self.dims.len()
    }

    pub fn weights(&self) -> &[f64] {
        self.weights.as_slice()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn weight(&self, assignment: &[usize]) -> f64 {
        let mut index = 0;
        for (dim, value) in self.dims.iter().zip(assignment.iter()) {
            index = index * dim + value;
        }
        self.weights[index]
    }

    /// Visit every joint assignment in storage order.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&[usize], f64),
    {
        let mut assignment = vec![0; self.dims.len()];
        for w in &self.weights {
            f(assignment.as_slice(), *w);
            advance(&self.dims, &mut assignment);
        }
    }
}

fn advance(dims: &[usize], assignment: &mut [usize]) {
    for i in (0..dims.len()).rev() {
        assignment[i] += 1;
        if assignment[i] < dims[i] {
            return;
        }
        assignment[i] = 0;
    }
}

#[cfg(test)]
mod tests {
    use crate::api::error::ModelError;
    use crate::model::FactorTable;

    #[test]
    pub fn table_size_test() {
        let e = FactorTable::new(vec![2, 3], vec![1f64; 5]).unwrap_err();
        assert_eq!(
            e,
            ModelError::TableSize {
                expected: 6,
                actual: 5
            }
        );
        assert!(FactorTable::new(vec![2], vec![1f64, -1f64]).is_err());
    }

    #[test]
    pub fn row_major_order_test() {
        let table = FactorTable::from_fn(vec![2, 3], |a| (a[0] * 10 + a[1]) as f64).unwrap();
        assert_eq!(
            table.weights(),
            &[0f64, 1f64, 2f64, 10f64, 11f64, 12f64]
        );
        assert_eq!(table.weight(&[1, 2]), 12f64);

        let mut visited = Vec::new();
        table.for_each(|a, w| visited.push((a.to_vec(), w)));
        assert_eq!(visited[4], (vec![1, 1], 11f64));
    }

    #[test]
    pub fn xor_equality_test() {
        let xor = FactorTable::xor(3);
        assert_eq!(xor.len(), 8);
        assert_eq!(xor.weight(&[1, 1, 0]), 1f64);
        assert_eq!(xor.weight(&[1, 0, 0]), 0f64);

        let eq = FactorTable::equality(3, 2);
        assert_eq!(eq.weight(&[2, 2]), 1f64);
        assert_eq!(eq.weight(&[2, 1]), 0f64);
    }
}
