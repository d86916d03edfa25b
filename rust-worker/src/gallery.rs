//! Funnel gallery ordering.
//!
//! The gallery keeps a dense `sort_order` of 0..n. Any move rewrites the
//! full ordering rather than swapping two rows, so deletes and reorders
//! can never leave gaps or duplicates behind.

use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{GalleryImage, Store};

/// Move the image at `from` to position `to` and return the dense
/// reassignment `(id, sort_order)` for every row. Out-of-range indexes
/// leave the ordering unchanged.
pub fn reorder(images: &[GalleryImage], from: usize, to: usize) -> Vec<(Uuid, i32)> {
    let mut ids: Vec<Uuid> = images.iter().map(|i| i.id).collect();
    if from < ids.len() && to < ids.len() {
        let id = ids.remove(from);
        ids.insert(to, id);
    }
    ids.into_iter()
        .enumerate()
        .map(|(index, id)| (id, index as i32))
        .collect()
}

/// Apply a move to a funnel's gallery in the store.
pub async fn move_image(
    store: &dyn Store,
    funnel_id: Uuid,
    from: usize,
    to: usize,
) -> Result<(), StoreError> {
    let images = store.gallery_images(funnel_id).await?;
    let updates = reorder(&images, from, to);
    store.set_gallery_order(&updates).await?;

    info!(
        funnel_id = %funnel_id,
        images = updates.len(),
        from = from,
        to = to,
        "gallery_reordered"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn image(funnel_id: Uuid, sort_order: i32) -> GalleryImage {
        GalleryImage {
            id: Uuid::new_v4(),
            funnel_id,
            image_url: format!("https://cdn.example.com/{sort_order}.jpg"),
            sort_order,
        }
    }

    #[test]
    fn test_move_last_to_first() {
        let funnel_id = Uuid::new_v4();
        let images: Vec<GalleryImage> = (0..4).map(|i| image(funnel_id, i)).collect();

        let updates = reorder(&images, 3, 0);

        let orders: Vec<i32> = updates.iter().map(|(_, o)| *o).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
        assert_eq!(updates[0].0, images[3].id);
        assert_eq!(updates[1].0, images[0].id);
        assert_eq!(updates[3].0, images[2].id);
    }

    #[test]
    fn test_out_of_range_is_noop() {
        let funnel_id = Uuid::new_v4();
        let images: Vec<GalleryImage> = (0..3).map(|i| image(funnel_id, i)).collect();

        let updates = reorder(&images, 7, 0);
        let ids: Vec<Uuid> = updates.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, images.iter().map(|i| i.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_move_image_rewrites_store_order() {
        let store = MemoryStore::new();
        let funnel_id = Uuid::new_v4();
        let images: Vec<GalleryImage> = (0..4).map(|i| image(funnel_id, i)).collect();
        for img in &images {
            store.seed_gallery_image(img.clone()).await;
        }

        move_image(&store, funnel_id, 3, 0).await.unwrap();

        let after = store.gallery_images(funnel_id).await.unwrap();
        let orders: Vec<i32> = after.iter().map(|i| i.sort_order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
        assert_eq!(after[0].id, images[3].id);
    }
}
