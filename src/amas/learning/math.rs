//! 行优先存储的 SPD 矩阵维护：Cholesky 分解、rank-1 更新与三角求解。

pub const EPSILON: f64 = 1e-10;
pub const MIN_LAMBDA: f64 = 1e-3;

/// rank-1 更新后对角线下限系数：diag >= sqrt(lambda) * 0.1
pub const RANK1_DIAG_FLOOR_RATIO: f64 = 0.1;

/// Cholesky 分解：将正定矩阵 A 分解为 L·Lᵀ。
/// 对角出现非正值时用 sqrt(lambda) 兜底，保证 L 始终可用。
pub fn cholesky_decompose(a: &[f64], d: usize, lambda: f64) -> Vec<f64> {
    let safe_lambda = lambda.max(MIN_LAMBDA);
    let mut l = vec![0.0; d * d];

    let mut work = a.to_vec();
    for i in 0..d {
        work[i * d + i] += safe_lambda * EPSILON;
    }

    for i in 0..d {
        for j in 0..=i {
            let mut sum = work[i * d + j];
            for k in 0..j {
                sum -= l[i * d + k] * l[j * d + k];
            }

            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    l[i * d + i] = safe_lambda.sqrt();
                } else {
                    l[i * d + i] = sum.sqrt();
                }
            } else {
                let diag = l[j * d + j];
                if diag.abs() > EPSILON {
                    l[i * d + j] = sum / diag;
                } else {
                    l[i * d + j] = 0.0;
                }
            }
        }
    }

    l
}

/// Cholesky rank-1 更新（Givens 旋转）：L'·L'ᵀ = L·Lᵀ + x·xᵀ，O(d²)。
/// 用 hypot 计算旋转半径避免平方溢出。
/// 返回 false 表示数值不稳定，调用方应走完整重分解。
pub fn cholesky_rank1_update(l: &mut [f64], x: &[f64], d: usize, min_diag: f64) -> bool {
    let mut x_work = x.to_vec();

    for k in 0..d {
        let l_kk = l[k * d + k];
        let x_k = x_work[k];

        let r = l_kk.hypot(x_k);
        if r < min_diag || !r.is_finite() {
            return false;
        }

        let c = l_kk / r;
        let s = x_k / r;

        l[k * d + k] = r;

        for i in (k + 1)..d {
            let l_ik = l[i * d + k];
            let x_i = x_work[i];

            l[i * d + k] = c * l_ik + s * x_i;
            x_work[i] = -s * l_ik + c * x_i;
        }
    }

    for i in 0..d {
        let diag = l[i * d + i];
        if diag < min_diag || !diag.is_finite() {
            return false;
        }
    }

    true
}

/// 用 Cholesky 因子求解 A·x = b，其中 A = L·Lᵀ
pub fn solve_cholesky(l: &[f64], b: &[f64], d: usize) -> Vec<f64> {
    let y = solve_triangular_lower(l, b, d);
    solve_triangular_upper_transpose(l, &y, d)
}

/// 前向替换：L·x = b
pub fn solve_triangular_lower(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];

    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * x[j];
        }

        let diag = l[i * n + i];
        if diag.abs() > EPSILON {
            x[i] = sum / diag;
        } else {
            x[i] = 0.0;
        }
    }

    x
}

/// 后向替换：Lᵀ·x = b
fn solve_triangular_upper_transpose(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];

    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }

        let diag = l[i * n + i];
        if diag.abs() > EPSILON {
            x[i] = sum / diag;
        } else {
            x[i] = 0.0;
        }
    }

    x
}

/// xᵀ·A⁻¹·x = ‖L⁻¹x‖²，UCB 置信半径用
pub fn compute_quadratic_form(l: &[f64], x: &[f64], d: usize) -> f64 {
    let z = solve_triangular_lower(l, x, d);
    z.iter().map(|&v| v * v).sum()
}

pub fn mat_vec_mul(a: &[f64], x: &[f64], d: usize) -> Vec<f64> {
    let mut result = vec![0.0; d];
    for i in 0..d {
        for j in 0..d {
            result[i] += a[i * d + j] * x[j];
        }
    }
    result
}

pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// 外积累加：A += x·xᵀ
pub fn rank1_update_matrix(a: &mut [f64], x: &[f64], d: usize) {
    for i in 0..d {
        for j in 0..d {
            a[i * d + j] += x[i] * x[j];
        }
    }
}

/// 向量缩放累加：a += scale·b
pub fn vec_add_scaled(a: &mut [f64], b: &[f64], scale: f64) {
    for (ai, &bi) in a.iter_mut().zip(b.iter()) {
        *ai += scale * bi;
    }
}

/// 协方差矩阵修复：对称化平均、对角下限 lambda、上限截断
pub fn sanitize_covariance(a: &mut [f64], d: usize, lambda: f64, max_covariance: f64) {
    for i in 0..d {
        for j in (i + 1)..d {
            let avg = (a[i * d + j] + a[j * d + i]) / 2.0;
            let fixed = if avg.is_finite() {
                avg.clamp(-max_covariance, max_covariance)
            } else {
                0.0
            };
            a[i * d + j] = fixed;
            a[j * d + i] = fixed;
        }
        let diag = a[i * d + i];
        a[i * d + i] = if diag.is_finite() {
            diag.clamp(lambda, max_covariance)
        } else {
            lambda
        };
    }
}

/// L 是否仍然健康：对角正且有界，元素不超过 sqrt(max_covariance)
pub fn factor_is_healthy(l: &[f64], d: usize, min_diag: f64, max_covariance: f64) -> bool {
    let max_element = max_covariance.sqrt();
    for i in 0..d {
        let diag = l[i * d + i];
        if !diag.is_finite() || diag < min_diag {
            return false;
        }
        for j in 0..d {
            let v = l[i * d + j];
            if !v.is_finite() || v.abs() > max_element {
                return false;
            }
        }
    }
    true
}
