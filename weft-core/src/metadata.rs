//! 声明式元数据的查询接口
//!
//! 容器只通过 [`MetadataLookup`] 读取类的声明；默认实现 [`DeclaredMetadata`]
//! 直接读取 `Class` 描述符。

use crate::class::{Class, ParamDescriptor, PropertyDescriptor, ProviderDeclaration};
use crate::scope::Scope;

pub trait MetadataLookup: Send + Sync {
    /// 构造参数，按声明顺序
    fn parameters(&self, class: &Class) -> Vec<ParamDescriptor>;

    /// 属性注入，包含从基类继承的声明（子类同名声明覆盖基类）
    fn properties(&self, class: &Class) -> Vec<PropertyDescriptor>;

    fn providers(&self, class: &Class) -> Vec<ProviderDeclaration>;

    fn scope(&self, class: &Class) -> Option<Scope>;

    fn decorators(&self, class: &Class) -> Vec<String>;
}

/// 读取 `Class` 上声明的元数据
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredMetadata;

impl MetadataLookup for DeclaredMetadata {
    fn parameters(&self, class: &Class) -> Vec<ParamDescriptor> {
        // 没有自己的参数声明时沿用基类的
        let mut current = Some(class);
        while let Some(c) = current {
            if !c.params().is_empty() {
                return c.params().to_vec();
            }
            current = c.base();
        }
        Vec::new()
    }

    fn properties(&self, class: &Class) -> Vec<PropertyDescriptor> {
        let mut result = match class.base() {
            Some(base) => self.properties(base),
            None => Vec::new(),
        };
        for property in class.own_properties() {
            match result.iter_mut().find(|p| p.name == property.name) {
                Some(existing) => *existing = property.clone(),
                None => result.push(property.clone()),
            }
        }
        result
    }

    fn providers(&self, class: &Class) -> Vec<ProviderDeclaration> {
        class.providers().to_vec()
    }

    fn scope(&self, class: &Class) -> Option<Scope> {
        class.scope()
    }

    fn decorators(&self, class: &Class) -> Vec<String> {
        class.decorators().to_vec()
    }
}
