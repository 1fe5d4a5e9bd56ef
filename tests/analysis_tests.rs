use image::{GrayImage, Luma};
use photon_layers::codec::{pack_bits, unpack};
use photon_layers::image::antialias::{threshold, threshold_rows};
use photon_layers::image::GrayPixel;
use photon_layers::layer::check_margin;
use photon_layers::{
    AaMatrix, AnalysisParams, GrayRaster, IslandRect, Layer, LayerDefinition, LayerFile,
    LayerGrid, LayerTable, NullProgress, PixelState, Resolution, Result,
};
use std::io::Write;
use tempfile::NamedTempFile;

/// Draws filled rectangles `(x1, y1, x2, y2)` in white on a black image.
fn draw(width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) -> GrayImage {
    let mut img = GrayImage::new(width, height);
    for &(x1, y1, x2, y2) in rects {
        for y in y1..=y2 {
            for x in x1..=x2 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
    }
    img
}

fn layer_from(img: &GrayImage) -> Layer {
    let data = pack_bits(img.pixels().map(|p| p.0[0] > 127));
    Layer::new(
        LayerDefinition {
            exposure: 8.0,
            off_time: 1.0,
            ..Default::default()
        },
        data,
    )
}

fn resolution_of(img: &GrayImage) -> Resolution {
    Resolution::new(img.width(), img.height())
}

#[test]
fn test_island_and_supported_example() -> Result<()> {
    let r = Resolution::new(3, 2);
    let current = draw(3, 2, &[(1, 0, 1, 0)]);

    let mut floating = LayerFile::new(
        r,
        vec![layer_from(&GrayImage::new(3, 2)), layer_from(&current)],
        AnalysisParams::default(),
    )?;
    floating.calculate(&NullProgress, None)?;
    assert_eq!(floating.layers()[1].grid(r)?.get(1, 0), PixelState::Island);

    let mut resting = LayerFile::new(
        r,
        vec![layer_from(&current), layer_from(&current)],
        AnalysisParams::default(),
    )?;
    resting.calculate(&NullProgress, None)?;
    assert_eq!(resting.layers()[1].grid(r)?.get(1, 0), PixelState::Supported);
    assert!(resting.islands().is_empty());
    Ok(())
}

#[test]
fn test_full_pass_twice_is_identical() -> Result<()> {
    let frames = [
        draw(32, 24, &[(4, 4, 20, 18)]),
        draw(32, 24, &[(4, 4, 20, 18), (24, 2, 28, 6)]),
        draw(32, 24, &[(10, 10, 14, 14), (24, 2, 28, 6)]),
        draw(32, 24, &[(12, 12, 30, 22)]),
    ];
    let r = resolution_of(&frames[0]);
    let layers = frames.iter().map(layer_from).collect();
    let mut file = LayerFile::new(r, layers, AnalysisParams::new().with_margin(2))?;

    file.calculate(&NullProgress, None)?;
    let first_islands = file.islands().clone();
    let first_packed: Vec<Vec<u8>> = file
        .layers()
        .iter()
        .map(|l| l.packed_classification().unwrap().to_vec())
        .collect();

    file.calculate(&NullProgress, None)?;
    let second_packed: Vec<Vec<u8>> = file
        .layers()
        .iter()
        .map(|l| l.packed_classification().unwrap().to_vec())
        .collect();

    assert_eq!(&first_islands, file.islands());
    assert_eq!(first_packed, second_packed);
    assert!(!first_islands.is_empty());
    assert_eq!(file.margin_layers(), vec![3]);
    Ok(())
}

#[test]
fn test_islands_tracked_over_layers() -> Result<()> {
    let frames = [
        draw(16, 16, &[(0, 0, 3, 3)]),
        draw(16, 16, &[(0, 0, 3, 3), (8, 8, 10, 10)]),
        draw(16, 16, &[(0, 0, 3, 3), (9, 9, 11, 11)]),
        draw(16, 16, &[(0, 0, 3, 3)]),
    ];
    let r = resolution_of(&frames[0]);
    let mut file = LayerFile::new(r, frames.iter().map(layer_from).collect(), AnalysisParams::default())?;
    file.calculate(&NullProgress, None)?;

    let islands: Vec<_> = file.islands().iter().copied().collect();
    assert_eq!(islands.len(), 1);
    assert_eq!(islands[0].rect, IslandRect::new(8, 8, 11, 11));
    assert_eq!((islands[0].first_layer, islands[0].last_layer), (1, 2));
    assert_eq!(file.layers_with_islands(), vec![1, 2]);

    // Overlapping part of layer 2 rests on the island, the rest floats.
    let grid = file.layers()[2].grid(r)?;
    assert_eq!(grid.get(9, 9), PixelState::IslandSupported);
    assert_eq!(grid.get(11, 11), PixelState::Island);
    Ok(())
}

#[test]
fn test_grid_round_trip_keeps_foreground() -> Result<()> {
    let r = Resolution::new(300, 3);
    let mut grid = LayerGrid::new(r);
    for x in 0..300 {
        grid.supported(x, 0);
    }
    grid.island(150, 1);
    grid.supported_by_island(299, 2);
    grid.mark_foreground(0, 2);
    grid.reduce();

    let image = unpack(&grid.pack_image_data(), r)?;
    assert_eq!(image.rows, grid.to_rows());
    assert_eq!(image.pixels, 303);
    Ok(())
}

#[test]
fn test_margin_boundary() {
    let r = Resolution::new(20, 20);
    let rows_of = |img: &GrayImage| -> Vec<photon_layers::codec::Row> {
        (0..img.height())
            .map(|y| (0..img.width()).map(|x| img.get_pixel(x, y).0[0] > 127).collect())
            .collect()
    };

    let edge = rows_of(&draw(20, 20, &[(0, 10, 0, 10)]));
    for margin in 1..=5 {
        assert!(check_margin(&edge, r, margin), "margin {}", margin);
    }

    for margin in 1..=5 {
        let inside = rows_of(&draw(20, 20, &[(margin, 10, margin, 10)]));
        assert!(!check_margin(&inside, r, margin), "margin {}", margin);
    }
}

#[test]
fn test_aa_threshold_example() {
    assert_eq!(threshold(4, 2), 127);

    let mut raster = GrayRaster::new(3, 1);
    raster.put_pixel(0, 0, GrayPixel::new(126));
    raster.put_pixel(1, 0, GrayPixel::new(127));
    raster.put_pixel(2, 0, GrayPixel::new(200));
    let rows = threshold_rows(&raster, threshold(4, 2));
    assert_eq!(
        rows[0].iter().map(|b| *b).collect::<Vec<_>>(),
        vec![false, true, true]
    );
}

#[test]
fn test_aa_layers_are_regenerated() -> Result<()> {
    let img = draw(24, 24, &[(6, 6, 17, 17)]);
    let r = resolution_of(&img);
    let params = AnalysisParams::new()
        .with_aa_level(4)
        .with_aa_matrix(AaMatrix::default());
    let mut file = LayerFile::new(r, vec![layer_from(&img)], params)?;
    file.calculate_aa_layers(&NullProgress, None)?;

    let layer = &file.layers()[0];
    assert_eq!(layer.anti_alias_layers().len(), 3);
    for aa in layer.anti_alias_layers() {
        assert_eq!(aa.exposure(), 8.0);
        assert!(!aa.is_calculated());
        // The solid interior is foreground at every threshold.
        assert!(aa.grid(r)?.get(12, 12).is_foreground());
        assert!(!aa.grid(r)?.get(0, 0).is_foreground());
    }
    // The first sub-layer reaches one pixel past the mask edge, the last does not.
    assert!(layer.anti_alias_layers()[0].grid(r)?.get(5, 12).is_foreground());
    assert!(!layer.anti_alias_layers()[2].grid(r)?.get(5, 12).is_foreground());
    Ok(())
}

#[test]
fn test_full_pass_leaves_aa_layers_as_raw_views() -> Result<()> {
    let img = draw(12, 12, &[(3, 3, 8, 8)]);
    let r = resolution_of(&img);
    let mut layer = layer_from(&img);
    layer.ensure_anti_alias_layers(2);
    for aa in layer.anti_alias_layers_mut() {
        *aa = layer_from(&img);
    }
    let mut file = LayerFile::new(r, vec![layer], AnalysisParams::new().with_aa_level(3))?;
    file.calculate(&NullProgress, None)?;

    let layer = &file.layers()[0];
    assert!(layer.is_calculated());
    assert_eq!(layer.grid(r)?.get(5, 5), PixelState::Supported);
    assert_eq!(layer.anti_alias_layers().len(), 2);
    for aa in layer.anti_alias_layers() {
        assert!(!aa.is_calculated());
        assert!(aa.classification(r)?.is_none());
        let grid = aa.grid(r)?;
        assert_eq!(grid.get(5, 5), PixelState::Unknown);
        assert_eq!(grid.get(3, 3), PixelState::Unknown);
        assert_eq!(grid.get(0, 0), PixelState::Off);
        assert_eq!(grid.get(9, 5), PixelState::Off);
        assert_eq!(aa.pixels(), 36);
    }
    Ok(())
}

#[test]
fn test_layer_table_through_file() -> Result<()> {
    let frames = [
        draw(16, 8, &[(2, 2, 6, 6)]),
        draw(16, 8, &[(2, 2, 6, 6), (10, 1, 12, 3)]),
    ];
    let r = resolution_of(&frames[0]);
    let params = AnalysisParams::new().with_aa_level(2);
    let mut file = LayerFile::new(r, frames.iter().map(layer_from).collect(), params.clone())?;
    file.calculate_aa_layers(&NullProgress, None)?;

    let header = b"LAYERTEST\0\0\0";
    let mut tmp = NamedTempFile::new()?;
    tmp.write_all(header)?;
    let mut body = Vec::new();
    let end = file.write_layers(&mut body, header.len())?;
    tmp.write_all(&body)?;
    tmp.flush()?;

    let bytes = std::fs::read(tmp.path())?;
    assert_eq!(bytes.len(), end);
    let table = LayerTable {
        offset: header.len(),
        layer_count: 2,
    };
    let mut read = LayerFile::read_layers(&bytes, r, table, params, &NullProgress)?;
    read.calculate(&NullProgress, None)?;
    file.calculate(&NullProgress, None)?;
    assert_eq!(read.islands(), file.islands());
    assert_eq!(read.layers()[1].island_count(), 9);
    assert_eq!(read.layers()[1].anti_alias_layers().len(), 1);
    Ok(())
}
