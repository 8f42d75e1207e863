//! pending任务队列
//!
//! 单一互斥锁保护的任务槽位切片。遍历期间删除采用"置空+压缩"，
//! 避免下标失效；锁内从不await。相同`plan_exec_at`按插入顺序触发。

use std::sync::Mutex;

use convoy_domain::Task;
use convoy_errors::{ConvoyError, ConvoyResult};

#[derive(Default)]
pub struct PendingQueue {
    slots: Mutex<Vec<Option<Task>>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加任务，id已存在时拒绝。
    pub fn add(&self, task: Task) -> ConvoyResult<()> {
        let mut slots = self.slots.lock().unwrap();
        if slots.iter().flatten().any(|t| t.id == task.id) {
            return Err(ConvoyError::duplicate_task_id(&task.id));
        }
        slots.push(Some(task));
        Ok(())
    }

    /// 移除首个匹配id的任务，返回是否删除了任务。
    pub fn delete(&self, id: &str) -> bool {
        let mut slots = self.slots.lock().unwrap();
        if let Some(pos) = slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|t| t.id == id))
        {
            slots.remove(pos);
            true
        } else {
            false
        }
    }

    /// 按id原地替换；不存在时退化为追加（删除后新增的修复路径）。
    pub fn update(&self, task: Task) {
        let mut slots = self.slots.lock().unwrap();
        match slots
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|t| t.id == task.id))
        {
            Some(slot) => *slot = Some(task),
            None => slots.push(Some(task)),
        }
    }

    /// 锁内遍历。谓词返回`Ok(true)`提前停止，返回错误时中断遍历。
    pub fn walk<F>(&self, mut predicate: F) -> ConvoyResult<()>
    where
        F: FnMut(usize, &Task) -> ConvoyResult<bool>,
    {
        let slots = self.slots.lock().unwrap();
        for (i, slot) in slots.iter().enumerate() {
            let Some(task) = slot else { continue };
            if predicate(i, task)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// 锁内遍历全部槽位，允许置空当前槽位，结束后压缩空洞。
    pub fn sweep<F>(&self, mut f: F)
    where
        F: FnMut(&mut Option<Task>),
    {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            f(slot);
        }
        slots.retain(Option::is_some);
    }

    /// 丢弃置空的槽位。
    pub fn compact(&self) {
        self.slots.lock().unwrap().retain(Option::is_some);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前队列中任务id的快照，按队列顺序。
    pub fn ids(&self) -> Vec<String> {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|t| t.id.clone())
            .collect()
    }
}
