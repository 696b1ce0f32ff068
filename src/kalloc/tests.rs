use super::*;
use crate::cpu::CpuGuard;
use crate::types::{KERNBASE, pg_round_down};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn kalloc(pages: usize, ncpu: usize) -> Kalloc {
    Kalloc::new(KallocConfig {
        kernel_end: KERNBASE,
        phys_top: KERNBASE + pages * PAGE_SIZE,
        ncpu,
    })
    .unwrap()
}

fn page_addr(index: usize) -> PhysAddr {
    PhysAddr::new(KERNBASE + index * PAGE_SIZE)
}

#[test]
fn test_init_partitions_pages() {
    let kalloc = kalloc(10, 4);
    assert_eq!(kalloc.total_pages(), 10);
    assert_eq!(kalloc.free_pages(), 10);

    // ceil(10 / 4) = 3 pages per partition, the last one short
    let per_cpu: Vec<_> = (0..4).map(|cpu| kalloc.free_pages_on(cpu)).collect();
    assert_eq!(per_cpu, vec![3, 3, 3, 1]);
    assert_eq!(kalloc.home_of(page_addr(0)), Some(0));
    assert_eq!(kalloc.home_of(page_addr(5)), Some(1));
    assert_eq!(kalloc.home_of(page_addr(9)), Some(3));
    assert_eq!(kalloc.home_of(page_addr(10)), None);
}

#[test]
fn test_init_skips_partial_pages() {
    let kalloc = Kalloc::new(KallocConfig {
        kernel_end: KERNBASE + 100,
        phys_top: KERNBASE + 5 * PAGE_SIZE + 100,
        ncpu: 2,
    })
    .unwrap();
    assert_eq!(kalloc.total_pages(), 4);
    assert_eq!(kalloc.free_pages(), 4);
    assert_eq!(kalloc.home_of(PhysAddr::new(KERNBASE)), None);
}

#[test]
fn test_range_at_top_of_address_space() {
    let end = pg_round_down(usize::MAX);
    let kalloc = Kalloc::new(KallocConfig {
        kernel_end: end - PAGE_SIZE,
        phys_top: usize::MAX,
        ncpu: 2,
    })
    .unwrap();
    assert_eq!(kalloc.total_pages(), 1);
    assert_eq!(kalloc.free_pages(), 1);

    let page = kalloc.alloc_on(1).unwrap();
    assert_eq!(page, PhysAddr::new(end - PAGE_SIZE));
    assert_eq!(kalloc.alloc_on(1), Err(AllocError::OutOfMemory));
    kalloc.free(page);

    let empty = Kalloc::new(KallocConfig {
        kernel_end: usize::MAX - PAGE_SIZE,
        phys_top: usize::MAX,
        ncpu: 1,
    })
    .unwrap();
    assert_eq!(empty.total_pages(), 0);
    assert_eq!(empty.alloc(), Err(AllocError::OutOfMemory));
}

#[test]
#[should_panic(expected = "free list push of unmanaged page")]
fn test_free_list_push_rejects_unmanaged_page() {
    let kalloc = kalloc(2, 1);
    let mut list = FreeList::new();
    list.push(&kalloc.memory, KERNBASE + 2 * PAGE_SIZE);
}

#[test]
fn test_invalid_config_rejected() {
    let result = Kalloc::new(KallocConfig {
        kernel_end: KERNBASE,
        phys_top: KERNBASE + PAGE_SIZE,
        ncpu: 0,
    });
    assert!(result.is_err());
}

#[test]
fn test_steals_when_local_list_empty() {
    let kalloc = kalloc(4, 2);
    assert_eq!(kalloc.free_pages_on(0), 2);
    assert_eq!(kalloc.free_pages_on(1), 2);

    let first = kalloc.alloc_on(0).unwrap();
    let second = kalloc.alloc_on(0).unwrap();
    assert_eq!(kalloc.home_of(first), Some(0));
    assert_eq!(kalloc.home_of(second), Some(0));
    assert_eq!(kalloc.free_pages_on(0), 0);

    let stolen = kalloc.alloc_on(0).unwrap();
    assert_eq!(kalloc.home_of(stolen), Some(1));
    assert_eq!(kalloc.free_pages_on(1), 1);
    assert_eq!(kalloc.free_pages(), 1);
}

#[test]
fn test_steal_probes_in_cpu_order() {
    let kalloc = kalloc(4, 4);
    let homes: Vec<_> = (0..4)
        .map(|_| kalloc.home_of(kalloc.alloc_on(2).unwrap()).unwrap())
        .collect();
    assert_eq!(homes, vec![2, 0, 1, 3]);
    assert_eq!(kalloc.alloc_on(2), Err(AllocError::OutOfMemory));
}

#[test]
fn test_exhaustion_is_recoverable() {
    let kalloc = kalloc(2, 1);
    let a = kalloc.alloc().unwrap();
    let b = kalloc.alloc().unwrap();
    assert_ne!(a, b);

    let err = kalloc.alloc().unwrap_err();
    assert_eq!(err, AllocError::OutOfMemory);
    assert_eq!(err.to_string(), "Out of memory");

    kalloc.free(b);
    assert_eq!(kalloc.alloc().unwrap(), b);
}

#[test]
fn test_alloc_uses_current_cpu() {
    let kalloc = kalloc(8, 4);
    let _cpu = CpuGuard::bind(3);
    let page = kalloc.alloc().unwrap();
    assert_eq!(kalloc.home_of(page), Some(3));
}

#[test]
fn test_free_returns_page_to_home_partition() {
    let kalloc = kalloc(4, 2);
    let page = kalloc.alloc_on(0).unwrap();
    assert_eq!(kalloc.free_pages_on(0), 1);

    {
        let _cpu = CpuGuard::bind(1);
        kalloc.free(page);
    }
    assert_eq!(kalloc.free_pages_on(0), 2);
    assert_eq!(kalloc.free_pages_on(1), 2);
}

#[test]
fn test_fill_patterns() {
    let kalloc = kalloc(2, 1);
    let page = kalloc.alloc().unwrap();
    {
        let mut bytes = kalloc.page(page).unwrap();
        assert!(bytes.iter().all(|&b| b == ALLOC_FILL));
        bytes[..4].copy_from_slice(b"data");
    }

    kalloc.free(page);
    assert!(kalloc.page(page).is_none());

    // The first word holds the free-list link
    let frame = kalloc.memory.frame(page.as_usize()).unwrap();
    assert!(frame.lock()[8..].iter().all(|&b| b == FREE_FILL));
}

#[test]
fn test_page_rejects_unmanaged_addresses() {
    let kalloc = kalloc(2, 1);
    let page = kalloc.alloc().unwrap();
    assert!(kalloc.page(PhysAddr::new(page.as_usize() + 1)).is_none());
    assert!(kalloc.page(page_addr(2)).is_none());
    assert!(kalloc.page(PhysAddr::new(KERNBASE - PAGE_SIZE)).is_none());
}

#[test]
#[should_panic(expected = "kfree: invalid address")]
fn test_free_below_range_panics() {
    let kalloc = kalloc(4, 2);
    kalloc.free(PhysAddr::new(KERNBASE - 1));
}

#[test]
#[should_panic(expected = "kfree: invalid address")]
fn test_free_misaligned_panics() {
    let kalloc = kalloc(4, 2);
    let page = kalloc.alloc().unwrap();
    kalloc.free(PhysAddr::new(page.as_usize() + 8));
}

#[test]
#[should_panic(expected = "kfree: invalid address")]
fn test_free_above_top_panics() {
    let kalloc = kalloc(4, 2);
    kalloc.free(page_addr(4));
}

#[test]
#[should_panic(expected = "kfree: invalid address")]
fn test_free_below_kernel_end_panics() {
    let kalloc = Kalloc::new(KallocConfig {
        kernel_end: KERNBASE + PAGE_SIZE,
        phys_top: KERNBASE + 4 * PAGE_SIZE,
        ncpu: 1,
    })
    .unwrap();
    kalloc.free(PhysAddr::new(KERNBASE));
}

#[test]
#[should_panic(expected = "kfree: double free")]
fn test_double_free_panics() {
    let kalloc = kalloc(4, 2);
    let page = kalloc.alloc().unwrap();
    kalloc.free(page);
    kalloc.free(page);
}

#[test]
fn test_random_sequence_conserves_pages() {
    let kalloc = kalloc(16, 3);
    let mut rng = rand::thread_rng();
    let mut held: Vec<PhysAddr> = Vec::new();

    for _ in 0..2_000 {
        if rng.gen_bool(0.5) && !held.is_empty() {
            let index = rng.gen_range(0..held.len());
            kalloc.free(held.swap_remove(index));
        } else {
            match kalloc.alloc_on(rng.gen_range(0..3)) {
                Ok(page) => {
                    assert!(!held.contains(&page), "{} handed out twice", page);
                    held.push(page);
                }
                Err(AllocError::OutOfMemory) => assert_eq!(held.len(), 16),
            }
        }
        assert_eq!(kalloc.free_pages() + held.len(), kalloc.total_pages());
    }
}

#[test]
fn test_concurrent_alloc_free_conserves_pages() {
    const THREADS: usize = 4;
    const ITERATIONS: usize = 2_000;

    let kalloc = Arc::new(kalloc(64, THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|cpu| {
            let kalloc = kalloc.clone();
            thread::spawn(move || {
                let _cpu = CpuGuard::bind(cpu);
                let mut rng = rand::thread_rng();
                let mut held = Vec::new();
                for _ in 0..ITERATIONS {
                    if rng.gen_bool(0.4) && !held.is_empty() {
                        kalloc.free(held.pop().unwrap());
                    } else if let Ok(page) = kalloc.alloc() {
                        held.push(page);
                    }
                }
                held
            })
        })
        .collect();

    let mut owned = HashSet::new();
    for handle in handles {
        for page in handle.join().unwrap() {
            assert!(owned.insert(page), "{} owned by two threads", page);
        }
    }
    assert_eq!(kalloc.free_pages() + owned.len(), kalloc.total_pages());

    for page in owned {
        kalloc.free(page);
    }
    assert_eq!(kalloc.free_pages(), kalloc.total_pages());
}
