//! 进程级容器

use super::DiContainer;
use crate::config::ConfigMap;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::sync::Arc;

lazy_static! {
    static ref GLOBAL_CONTAINER: Mutex<Option<Arc<DiContainer>>> = Mutex::new(None);
}

/// 获取全局容器，不存在时以非测试模式创建
pub fn global_container() -> Arc<DiContainer> {
    GLOBAL_CONTAINER
        .lock()
        .get_or_insert_with(|| Arc::new(DiContainer::default()))
        .clone()
}

/// 创建或重新配置全局容器
///
/// 与全局配置注册表不同，重复调用会更新已有容器的设置。
pub fn configure_global_container(
    test_mode: bool,
    config_override: Option<ConfigMap>,
) -> Arc<DiContainer> {
    let mut slot = GLOBAL_CONTAINER.lock();
    match slot.as_ref() {
        Some(existing) => {
            existing.configure(test_mode, config_override);
            existing.clone()
        }
        None => {
            let container = Arc::new(DiContainer::new(test_mode, config_override));
            *slot = Some(container.clone());
            container
        }
    }
}

/// 丢弃全局容器，下次访问时重新创建
pub fn reset_global_container() {
    GLOBAL_CONTAINER.lock().take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::container::TestMode;

    #[test]
    fn test_global_container_lifecycle() {
        reset_global_container();
        let first = global_container();
        assert!(Arc::ptr_eq(&first, &global_container()));

        let configured = configure_global_container(true, None);
        assert!(Arc::ptr_eq(&first, &configured));
        assert!(configured.test_mode());
        assert_eq!(*configured.resolve::<TestMode>().unwrap(), TestMode(true));

        reset_global_container();
        let fresh = global_container();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert!(!fresh.test_mode());
        reset_global_container();
    }
}
