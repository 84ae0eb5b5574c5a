//! 生命周期钩子
//!
//! 调用实例的初始化与销毁钩子。初始化失败会使加载失败；销毁失败
//! （包括 panic）只记录日志，不会阻止卸载。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use tracing::{debug, warn};

use crate::module::instance::ModuleRef;
use crate::utils::{LoadError, LoadResult};

/// 从 `started` 到现在经过的毫秒数
pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// 调用初始化钩子
///
/// # Returns
///
/// 实例有初始化钩子时返回其耗时（毫秒），没有时返回 `None`
///
/// # Errors
///
/// 钩子返回错误时返回 `LoadError::InitFailure`
pub async fn initialize(module_id: &str, instance: &ModuleRef) -> LoadResult<Option<f64>> {
    let Some(hook) = instance.initialize() else {
        return Ok(None);
    };

    let started = Instant::now();
    hook.await.map_err(|e| LoadError::InitFailure {
        module_id: module_id.to_string(),
        reason: format!("{:#}", e),
    })?;

    let duration_ms = elapsed_ms(started);
    debug!(module_id = %module_id, duration_ms = duration_ms, "初始化钩子完成");
    Ok(Some(duration_ms))
}

/// 调用销毁钩子
///
/// # Returns
///
/// 钩子不存在或成功时返回 `true`，失败或 panic 时返回 `false`
pub fn destroy(module_id: &str, instance: &ModuleRef) -> bool {
    match catch_unwind(AssertUnwindSafe(|| instance.destroy())) {
        Ok(None) => true,
        Ok(Some(Ok(()))) => {
            debug!(module_id = %module_id, "销毁钩子完成");
            true
        }
        Ok(Some(Err(e))) => {
            warn!(module_id = %module_id, error = %format!("{:#}", e), "销毁钩子失败，已忽略");
            false
        }
        Err(_) => {
            warn!(module_id = %module_id, "销毁钩子 panic，已忽略");
            false
        }
    }
}
