// This module manages the three memory regions a run needs: code (where each task's
// generated instruction stream is written and then executed), data (the private memory
// each task's generated code loads from and stores to) and communication (reserved for
// cross-task exchange, mapped but not used by the core). Each region is one anonymous
// MAP_SHARED mapping with read/write/execute permission, sized to hold one page-aligned
// sub-region per task, so forked tasks all see the same physical pages. Sub-region
// addresses are computed from the task index (base + index * stride) instead of being
// stored anywhere. Mapping failures are reported as RegionError naming the region;
// release is best-effort and also happens on drop.

//! Shared executable memory regions partitioned per task.

use std::fmt;
use std::io;
use std::ptr;

use crate::core::config::{
    COMM_BYTES_PER_TASK, CODE_BYTES_PER_TASK, DATA_BYTES_PER_TASK, PAGE_SIZE,
};
use crate::core::error::{RegionError, RegionResult};

/// The three region kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Code,
    Data,
    Comm,
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegionKind::Code => "code",
            RegionKind::Data => "data",
            RegionKind::Comm => "communication",
        })
    }
}

/// System page size, falling back to 4 KiB.
pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        PAGE_SIZE
    }
}

/// One task's slice of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRegion {
    base: *mut u8,
    len: usize,
}

impl SubRegion {
    pub fn as_ptr(&self) -> *mut u8 {
        self.base
    }

    pub fn addr(&self) -> u64 {
        self.base as u64
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `[addr, addr + width)` lies inside this sub-region.
    pub fn contains(&self, addr: u64, width: usize) -> bool {
        addr >= self.addr() && addr + width as u64 <= self.addr() + self.len as u64
    }

    /// View the sub-region as a mutable byte slice.
    ///
    /// # Safety
    ///
    /// The owning [`RegionSet`] must outlive the slice, and no other live reference
    /// may alias the same sub-region.
    pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        std::slice::from_raw_parts_mut(self.base, self.len)
    }
}

/// A single anonymous shared mapping.
#[derive(Debug)]
pub struct Region {
    kind: RegionKind,
    base: *mut u8,
    len: usize,
    /// Logical bytes usable by each task.
    task_size: usize,
    /// Distance between consecutive task sub-regions.
    stride: usize,
    tasks: usize,
}

impl Region {
    /// Map `tasks` sub-regions of `task_size` logical bytes each.
    ///
    /// The mapping is `(task_size + page - 1) * tasks` bytes; each sub-region starts on
    /// a page boundary. A layout whose length does not fit in `usize` is rejected before
    /// anything is mapped.
    pub fn map(kind: RegionKind, task_size: usize, tasks: usize) -> RegionResult<Self> {
        let page = page_size();
        let len = task_size
            .checked_add(page - 1)
            .and_then(|padded| padded.checked_mul(tasks))
            .ok_or(RegionError::Layout { kind, task_size, tasks })?;
        // Cannot overflow: stride <= task_size + page - 1.
        let stride = task_size.div_ceil(page) * page;

        // SAFETY: anonymous mapping at a kernel-chosen address; nothing is aliased.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_ANONYMOUS | libc::MAP_SHARED,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(RegionError::Map { kind, len, source: io::Error::last_os_error() });
        }

        log::debug!("{kind} region mapped at {:#x} ({len} bytes, stride {stride})", base as usize);

        Ok(Self { kind, base: base as *mut u8, len, task_size, stride, tasks })
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Sub-region for `index`, `None` past the last task.
    pub fn task(&self, index: usize) -> Option<SubRegion> {
        if index >= self.tasks || self.base.is_null() {
            return None;
        }
        // SAFETY: index < tasks, and stride * tasks <= len.
        let base = unsafe { self.base.add(index * self.stride) };
        Some(SubRegion { base, len: self.task_size })
    }

    /// Unmap the region. Safe to call more than once.
    pub fn release(&mut self) -> RegionResult<()> {
        if self.base.is_null() {
            return Ok(());
        }
        // SAFETY: base/len came from a successful mmap and are unmapped once.
        let rc = unsafe { libc::munmap(self.base as *mut libc::c_void, self.len) };
        self.base = ptr::null_mut();
        if rc != 0 {
            return Err(RegionError::Unmap {
                kind: self.kind,
                len: self.len,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("{e}");
        }
    }
}

/// Sub-region addresses handed to one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRegions {
    pub index: usize,
    pub code: SubRegion,
    pub data: SubRegion,
    pub comm: SubRegion,
}

/// Code, data and communication regions for a whole run.
#[derive(Debug)]
pub struct RegionSet {
    code: Region,
    data: Region,
    comm: Region,
    tasks: usize,
}

impl RegionSet {
    /// Map all three regions with the default per-task sizes.
    pub fn acquire(tasks: usize) -> RegionResult<Self> {
        Self::acquire_with(tasks, CODE_BYTES_PER_TASK, DATA_BYTES_PER_TASK, COMM_BYTES_PER_TASK)
    }

    pub fn acquire_with(
        tasks: usize,
        code_size: usize,
        data_size: usize,
        comm_size: usize,
    ) -> RegionResult<Self> {
        // Regions mapped before a failure are unmapped by their Drop.
        let data = Region::map(RegionKind::Data, data_size, tasks)?;
        let code = Region::map(RegionKind::Code, code_size, tasks)?;
        let comm = Region::map(RegionKind::Comm, comm_size, tasks)?;
        Ok(Self { code, data, comm, tasks })
    }

    pub fn task_count(&self) -> usize {
        self.tasks
    }

    pub fn region(&self, kind: RegionKind) -> &Region {
        match kind {
            RegionKind::Code => &self.code,
            RegionKind::Data => &self.data,
            RegionKind::Comm => &self.comm,
        }
    }

    /// The three sub-regions belonging to task `index`.
    pub fn task(&self, index: usize) -> Option<TaskRegions> {
        Some(TaskRegions {
            index,
            code: self.code.task(index)?,
            data: self.data.task(index)?,
            comm: self.comm.task(index)?,
        })
    }

    /// Unmap all three regions, reporting the first failure.
    pub fn release(mut self) -> RegionResult<()> {
        let results = [self.code.release(), self.data.release(), self.comm.release()];
        results.into_iter().collect::<RegionResult<Vec<()>>>().map(|_| ())
    }
}
